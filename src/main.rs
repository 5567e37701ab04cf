use execution_time::ExecutionTime;
use rayon::prelude::*;
use std::{
    process,
    sync::atomic::{AtomicUsize, Ordering},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ingestao_fiscal::{
    Config, DocumentParser, FiscalError, FiscalResult, ParsedDocument, ResultadoArquivo,
    ResumoLote, clear_screen, exportar_itens_csv, fmt_milhares, get_config, imprimir_json,
    imprimir_resultados, imprimir_resumo, imprimir_versao_do_programa,
};

fn main() {
    // Relata o erro ao usuário final sem stack trace técnico
    if let Err(err) = run() {
        eprintln!("\n[ERRO CRÍTICO]: {err}");
        process::exit(1);
    }
}

fn run() -> FiscalResult<()> {
    let timer = ExecutionTime::start();

    // 1. Obter Configurações
    let config = get_config()?;

    // 2. Setup inicial
    iniciar_log(config.verbose);

    if let Some(threads) = config.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .map_err(|e| FiscalError::Config(e.to_string()))?;
    }

    if !config.json {
        clear_screen(config.clear)?;
        imprimir_versao_do_programa();
        println!(
            " Processando {} arquivo(s) fiscal(is)...\n",
            fmt_milhares(config.arquivos.len())
        );
    }

    // 3. Processamento paralelo: cada arquivo é independente
    let resultados = processar_arquivos(&config);

    let documentos: Vec<&ParsedDocument> = resultados
        .iter()
        .filter_map(|(_, resultado)| resultado.as_ref().ok())
        .collect();

    // 4. Saídas
    if config.json {
        imprimir_json(&documentos)?;
        for (path, resultado) in &resultados {
            if let Err(err) = resultado {
                eprintln!(" [FALHA] {}: {err}", path.display());
            }
        }
    } else {
        imprimir_resultados(&resultados, config.verbose);
        imprimir_resumo(&ResumoLote::de(&resultados));
    }

    if let Some(destino) = &config.csv {
        let total = exportar_itens_csv(&documentos, destino)?;
        eprintln!(
            " {} item(ns) SPED exportado(s) para <{}>",
            fmt_milhares(total),
            destino.display()
        );
    }

    if !config.json {
        timer.print_elapsed_time();
    }

    Ok(())
}

/// Logs vão para stderr; `RUST_LOG` prevalece sobre `--verbose`.
fn iniciar_log(verbose: bool) {
    let padrao = if verbose { "debug" } else { "warn" };
    let filtro = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(padrao));

    tracing_subscriber::fmt()
        .with_env_filter(filtro)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn processar_arquivos(config: &Config) -> Vec<ResultadoArquivo> {
    let parser = DocumentParser::new(config.parser.clone());
    let total = config.arquivos.len();

    // Contador compartilhado entre as threads, sem trava
    let concluidos = AtomicUsize::new(0);

    config
        .arquivos
        .par_iter()
        .map(|path| {
            let resultado = parser.parse_document(path);

            let n = concluidos.fetch_add(1, Ordering::Relaxed) + 1;
            info!(concluidos = n, total, arquivo = %path.display(), ok = resultado.is_ok(), "progresso");

            (path.clone(), resultado)
        })
        .collect()
}
