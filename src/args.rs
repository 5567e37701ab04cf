use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{FiscalError, FiscalResult, IntegrityLimits, ParserConfig, REGEX_ARQUIVO_FISCAL};

// Estrutura para o Clap processar os argumentos da linha de comando
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    /// Arquivos ou diretórios a processar.
    ///
    /// Diretórios são varridos (sem recursão) em busca de arquivos
    /// .xml, .txt, .xlsx, .xls, .csv e .pdf.
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Clear screen
    #[arg(short, long, default_value_t = false)]
    clear: bool,

    /// Imprimir os documentos normalizados em JSON
    #[arg(short, long, default_value_t = false)]
    json: bool,

    /// Exportar os itens SPED consolidados para este arquivo CSV
    #[arg(long, value_name = "ARQUIVO")]
    csv: Option<PathBuf>,

    /// Número de threads (padrão: uma por núcleo)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Teto absoluto de tamanho por arquivo, em MB
    #[arg(long, value_name = "MB")]
    limite_mb: Option<u64>,

    /// Ativar modo detalhado (verbose)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug)]
pub struct Config {
    pub clear: bool,
    pub json: bool,
    pub csv: Option<PathBuf>,
    pub threads: Option<usize>,
    pub verbose: bool,

    // Arquivos a processar, já expandidos e ordenados
    pub arquivos: Vec<PathBuf>,

    pub parser: ParserConfig,
}

pub fn get_config() -> FiscalResult<Config> {
    let args = Arguments::parse();

    // 1. Expansão dos diretórios
    let mut arquivos = Vec::new();
    for path in &args.paths {
        if path.is_dir() {
            arquivos.extend(buscar_arquivos_fiscais(path)?);
        } else {
            arquivos.push(path.clone());
        }
    }

    if arquivos.is_empty() {
        return Err(FiscalError::Config(
            "Nenhum arquivo fiscal encontrado nos caminhos informados".into(),
        ));
    }

    // 2. Tetos de integridade
    let mut limites = IntegrityLimits::default();
    if let Some(mb) = args.limite_mb {
        if mb == 0 {
            return Err(FiscalError::Config("--limite-mb deve ser maior que zero".into()));
        }
        limites.absoluto = mb.saturating_mul(1024 * 1024);
    }

    if args.threads == Some(0) {
        return Err(FiscalError::Config("--threads deve ser maior que zero".into()));
    }

    Ok(Config {
        clear: args.clear,
        json: args.json,
        csv: args.csv,
        threads: args.threads,
        verbose: args.verbose,
        arquivos,
        parser: ParserConfig {
            limites,
            ..ParserConfig::default()
        },
    })
}

/// Arquivos com extensão suportada em `dir`, em ordem alfabética.
pub fn buscar_arquivos_fiscais(dir: &Path) -> FiscalResult<Vec<PathBuf>> {
    // 1. Leitura do diretório
    let mut arquivos: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| FiscalError::IoReader {
            source,
            arquivo: dir.to_path_buf(),
        })?
        .flatten() // ignora entradas ilegíveis
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| REGEX_ARQUIVO_FISCAL.is_match(name))
        })
        .collect();

    // 2. Ordenação (alfabética)
    arquivos.sort();

    Ok(arquivos)
}
