use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::Command,
};

use crate::{DadosFiscais, FiscalError, FiscalResult, ParsedDocument, fmt_milhares};

/// Resultado de um arquivo do lote.
pub type ResultadoArquivo = (PathBuf, FiscalResult<ParsedDocument>);

/// Contagens do lote. "Falha" é arquivo que não pôde ser interpretado;
/// achados de validação não contam como falha.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResumoLote {
    pub processados: usize,
    pub falhas: usize,
    pub com_erros: usize,
    pub com_avisos: usize,
    pub validacoes: usize,
    pub itens_sped: usize,
}

impl ResumoLote {
    pub fn de(resultados: &[ResultadoArquivo]) -> Self {
        resultados
            .iter()
            .fold(ResumoLote::default(), |mut resumo, (_, resultado)| {
                match resultado {
                    Ok(doc) => {
                        resumo.processados += 1;
                        resumo.validacoes += doc.validacoes.len();
                        if !doc.aceitavel() {
                            resumo.com_erros += 1;
                        }
                        if doc.avisos().next().is_some() {
                            resumo.com_avisos += 1;
                        }
                        if let DadosFiscais::Sped(sped) = &doc.dados_fiscais {
                            resumo.itens_sped += sped.itens.len();
                        }
                    }
                    Err(_) => resumo.falhas += 1,
                }
                resumo
            })
    }
}

/// Uma linha por arquivo; achados de erro e aviso listados abaixo dela.
pub fn imprimir_resultados(resultados: &[ResultadoArquivo], verbose: bool) {
    for (path, resultado) in resultados {
        match resultado {
            Ok(doc) => {
                let erros = doc.erros().count();
                let avisos = doc.avisos().count();
                println!(
                    " [{}] {} ({}): {} validações, {} erro(s), {} aviso(s), {} campo(s) padronizado(s)",
                    if erros == 0 { "OK" } else { "ACHADOS" },
                    doc.nome_arquivo,
                    doc.tipo_arquivo,
                    fmt_milhares(doc.validacoes.len()),
                    erros,
                    avisos,
                    doc.metadata.campos_padronizados,
                );

                doc.validacoes
                    .iter()
                    .filter(|v| verbose || v.is_error() || v.is_warning())
                    .for_each(|v| println!("        {v}"));
            }
            Err(err) => {
                println!(" [FALHA] {}", path.display());
                for linha in err.to_string().lines() {
                    println!("        {linha}");
                }
            }
        }
    }
    println!();
}

pub fn imprimir_resumo(resumo: &ResumoLote) {
    println!(" Arquivos interpretados: {}", fmt_milhares(resumo.processados));
    println!(" Arquivos não interpretados: {}", fmt_milhares(resumo.falhas));
    println!(" Arquivos com erros de validação: {}", fmt_milhares(resumo.com_erros));
    println!(" Arquivos com avisos de validação: {}", fmt_milhares(resumo.com_avisos));
    println!(" Total de validações: {}", fmt_milhares(resumo.validacoes));
    if resumo.itens_sped > 0 {
        println!(" Itens SPED consolidados: {}", fmt_milhares(resumo.itens_sped));
    }
    println!();
}

/// Envelopes em JSON (um array) na saída padrão.
pub fn imprimir_json(documentos: &[&ParsedDocument]) -> FiscalResult<()> {
    let json = serde_json::to_string_pretty(documentos)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

/// Grava os itens SPED consolidados de todos os documentos em CSV (`;`).
/// Retorna a quantidade de linhas gravadas.
pub fn exportar_itens_csv(documentos: &[&ParsedDocument], destino: &Path) -> FiscalResult<usize> {
    let arquivo = File::create(destino).map_err(|source| FiscalError::IoReader {
        source,
        arquivo: destino.to_path_buf(),
    })?;

    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(BufWriter::with_capacity(1024 * 1024, arquivo));

    let mut total = 0;
    for doc in documentos {
        if let DadosFiscais::Sped(sped) = &doc.dados_fiscais {
            for item in &sped.itens {
                wtr.serialize(item)?;
                total += 1;
            }
        }
    }

    wtr.flush()?;
    Ok(total)
}

pub fn clear_screen(clear_screen: bool) -> FiscalResult<()> {
    if clear_screen {
        if cfg!(target_os = "windows") {
            // 'cls' é comando interno do 'cmd'
            Command::new("cmd").args(["/c", "cls"]).status()?;
        } else {
            Command::new("clear").status()?;
        }
    }

    Ok(())
}

pub fn imprimir_versao_do_programa() {
    let descr = [
        "Este programa lê documentos fiscais eletrônicos (NF-e, CT-e, NFS-e e MDF-e em XML),",
        "arquivos da EFD ICMS/IPI e da EFD Contribuições, tabelas de regras tributárias",
        "(planilhas e CSV) e tabelas de programas estaduais de benefício fiscal (PDF).",
        "Cada arquivo passa por verificação de integridade antes da leitura.",
        "Os dados são normalizados e submetidos a validações de CNPJ/CPF, IE, CFOP, CST e NCM.",
    ];

    for line in &descr {
        println!(" {line}");
    }

    println!("\n versão: {}\n", env!("CARGO_PKG_VERSION"));
}
