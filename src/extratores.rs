//! Extração de tabelas de regras tributárias (planilhas e CSV) e de linhas
//! de benefício fiscal em PDFs de programas estaduais.

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{collections::HashSet, io::Cursor, panic, path::Path};
use tracing::debug;

use crate::{
    FiscalError, FiscalResult, FormatCollector, FormatIssue, REGEX_PROGRAMA_BENEFICIO,
    RE_LINHA_BENEFICIO, decodificar_texto, somente_digitos,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegraTabela {
    pub ncm: String,
    pub uf: Option<String>,
    pub aliquota: Option<Decimal>,
    pub reducao: Option<Decimal>,
    pub descricao: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TabelaRegras {
    pub regras: Vec<RegraTabela>,
    pub format_issues: Vec<FormatIssue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinhaBeneficio {
    pub ncm: String,
    pub percentual: Decimal,
    pub linha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BeneficioFiscal {
    /// Programa identificado pelo nome do arquivo (ex.: PRODEPE).
    pub programa: String,
    pub linhas: Vec<LinhaBeneficio>,
}

// --- Colunas ---

/// Posição de cada coluna reconhecida no cabeçalho.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MapaColunas {
    ncm: usize,
    uf: Option<usize>,
    aliquota: Option<usize>,
    reducao: Option<usize>,
    descricao: Option<usize>,
}

/// Minúsculas e sem acentos, para comparar nomes de coluna.
fn normalizar_nome(nome: &str) -> String {
    nome.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' | 'ü' => 'u',
            'ç' => 'c',
            _ => c,
        })
        .collect()
}

/// Valida o cabeçalho e localiza as colunas.
///
/// Nomes em branco ou repetidos são erro; a coluna de NCM é obrigatória,
/// as demais são opcionais.
fn verificar_colunas(column_names: &[&str], arquivo: &Path) -> FiscalResult<MapaColunas> {
    // 1. Nomes em branco
    if column_names.iter().any(|name| name.trim().is_empty()) {
        return Err(FiscalError::EmptyColumnName {
            arquivo: arquivo.to_path_buf(),
        });
    }

    // 2. Nomes repetidos
    let mut vista = HashSet::with_capacity(column_names.len());
    for name in column_names {
        if !vista.insert(normalizar_nome(name)) {
            return Err(FiscalError::DuplicateColumnName {
                arquivo: arquivo.to_path_buf(),
                coluna: name.to_string(),
            });
        }
    }

    // 3. Localização por nome normalizado
    let normalizados: Vec<String> = column_names.iter().map(|n| normalizar_nome(n)).collect();
    let posicao = |teste: fn(&str) -> bool| normalizados.iter().position(|n| teste(n.as_str()));

    let ncm = posicao(|n| n.contains("ncm")).ok_or_else(|| FiscalError::MissingEssentialColumn {
        arquivo: arquivo.to_path_buf(),
        coluna: "NCM".to_string(),
    })?;

    let mapa = MapaColunas {
        ncm,
        uf: posicao(|n| n == "uf" || n == "estado"),
        aliquota: posicao(|n| n.contains("aliq")),
        reducao: posicao(|n| n.contains("redu")),
        descricao: posicao(|n| n.contains("descri") || n.contains("produto") || n.contains("mercadoria")),
    };

    debug!(arquivo = %arquivo.display(), colunas = ?column_names, ?mapa, "cabeçalho validado");

    Ok(mapa)
}

fn montar_regra(
    celulas: &[String],
    mapa: &MapaColunas,
    linha: usize,
    coletor: &mut FormatCollector,
) -> Option<RegraTabela> {
    let celula = move |pos: Option<usize>| {
        pos.and_then(|p| celulas.get(p))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    };

    let mut ncm = somente_digitos(celula(Some(mapa.ncm))?).into_owned();
    if ncm.is_empty() {
        return None;
    }

    // Célula numérica perde o zero à esquerda dos capítulos 01 a 09
    if ncm.len() == 7 {
        ncm.insert(0, '0');
    }

    let mut percentual = |pos: Option<usize>, nome: &str| {
        celula(pos).map(|bruto| {
            coletor.decimal(&format!("linha[{linha}].{nome}"), bruto.trim_end_matches('%'))
        })
    };

    Some(RegraTabela {
        aliquota: percentual(mapa.aliquota, "aliquota"),
        reducao: percentual(mapa.reducao, "reducao"),
        uf: celula(mapa.uf).map(str::to_uppercase),
        descricao: celula(mapa.descricao).unwrap_or_default().to_string(),
        ncm,
    })
}

fn montar_tabela(
    cabecalho: &[String],
    linhas: impl Iterator<Item = Vec<String>>,
    arquivo: &Path,
) -> FiscalResult<TabelaRegras> {
    let column_names: Vec<&str> = cabecalho.iter().map(String::as_str).collect();
    let mapa = verificar_colunas(&column_names, arquivo)?;

    let mut coletor = FormatCollector::default();

    // Linha 1 é o cabeçalho
    let regras: Vec<RegraTabela> = linhas
        .enumerate()
        .filter_map(|(i, celulas)| montar_regra(&celulas, &mapa, i + 2, &mut coletor))
        .collect();

    debug!(arquivo = %arquivo.display(), regras = regras.len(), "tabela de regras extraída");

    Ok(TabelaRegras {
        regras,
        format_issues: coletor.into_issues(),
    })
}

// --- Planilhas ---

/// Números saem com vírgula decimal, como o restante da entrada.
fn texto_celula(celula: &Data) -> String {
    match celula {
        Data::Empty => String::new(),
        Data::Float(f) => f.to_string().replace('.', ","),
        Data::Int(i) => i.to_string(),
        outra => outra.to_string(),
    }
}

/// Primeira aba de uma planilha `.xlsx`/`.xls`.
pub fn extrair_regras_planilha(bytes: &[u8], arquivo: &Path) -> FiscalResult<TabelaRegras> {
    let mut planilha = open_workbook_auto_from_rs(Cursor::new(bytes))?;

    let range = planilha
        .worksheet_range_at(0)
        .ok_or_else(|| FiscalError::MissingEssentialColumn {
            arquivo: arquivo.to_path_buf(),
            coluna: "NCM (planilha sem abas)".to_string(),
        })??;

    let mut linhas = range
        .rows()
        .map(|linha| linha.iter().map(texto_celula).collect::<Vec<String>>());

    let cabecalho = linhas.next().unwrap_or_default();
    montar_tabela(&cabecalho, linhas, arquivo)
}

// --- CSV ---

/// CSV delimitado por `;` (UTF-8 ou Latin-1).
pub fn extrair_regras_csv(bytes: &[u8], arquivo: &Path) -> FiscalResult<TabelaRegras> {
    let texto = decodificar_texto(bytes);

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .buffer_capacity(128 * 1024)
        .from_reader(texto.as_bytes());

    let cabecalho: Vec<String> = rdr.headers()?.iter().map(String::from).collect();

    let linhas = rdr
        .records()
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|registro| registro.iter().map(String::from).collect());

    montar_tabela(&cabecalho, linhas, arquivo)
}

// --- PDF de benefícios ---

/// Programa de benefício citado no nome do arquivo, em maiúsculas.
pub fn programa_do_arquivo(nome: &str) -> Option<String> {
    REGEX_PROGRAMA_BENEFICIO
        .find(nome)
        .map(|m| m.as_str().to_uppercase())
}

/// Linhas "NCM ... percentual %" de um texto já extraído.
pub fn extrair_beneficios_texto(texto: &str, coletor: &mut FormatCollector) -> Vec<LinhaBeneficio> {
    texto
        .lines()
        .map(str::trim)
        .filter_map(|linha| {
            let caps = RE_LINHA_BENEFICIO.captures(linha)?;
            let percentual = coletor.decimal("beneficio.percentual", &caps["pct"]);
            Some(LinhaBeneficio {
                ncm: somente_digitos(&caps["ncm"]).into_owned(),
                percentual,
                linha: linha.to_string(),
            })
        })
        .collect()
}

pub fn extrair_beneficios_pdf(
    bytes: &[u8],
    arquivo: &Path,
    coletor: &mut FormatCollector,
) -> FiscalResult<BeneficioFiscal> {
    // pdf-extract entra em pânico com alguns PDFs malformados
    let texto = panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| FiscalError::Pdf(format!("{}: PDF ilegível", arquivo.display())))?
        .map_err(|e| FiscalError::Pdf(format!("{}: {e}", arquivo.display())))?;

    let nome = arquivo
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let beneficio = BeneficioFiscal {
        programa: programa_do_arquivo(&nome).unwrap_or_default(),
        linhas: extrair_beneficios_texto(&texto, coletor),
    };

    debug!(
        arquivo = %arquivo.display(),
        programa = %beneficio.programa,
        linhas = beneficio.linhas.len(),
        "tabela de benefício extraída do PDF"
    );

    Ok(beneficio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn arquivo() -> &'static Path {
        Path::new("tabela_regras.csv")
    }

    #[test]
    fn csv_com_colunas_por_nome() {
        let csv = "Descrição;NCM;UF;Alíquota;Redução BC\n\
                   Arroz;1006.30.21;sp;18,00;61,11%\n\
                   ;;;;\n\
                   Feijão;07133319;;12;\n";
        let tabela = extrair_regras_csv(csv.as_bytes(), arquivo()).unwrap();

        assert_eq!(tabela.regras.len(), 2);
        assert_eq!(
            tabela.regras[0],
            RegraTabela {
                ncm: "10063021".into(),
                uf: Some("SP".into()),
                aliquota: Some(dec!(18.00)),
                reducao: Some(dec!(61.11)),
                descricao: "Arroz".into(),
            }
        );
        assert_eq!(tabela.regras[1].uf, None);
        assert_eq!(tabela.regras[1].reducao, None);
        assert!(tabela.format_issues.is_empty());
    }

    #[test]
    fn csv_latin1() {
        let csv = b"NCM;Descri\xe7\xe3o\n02013000;Carne bovina\n";
        let tabela = extrair_regras_csv(csv, arquivo()).unwrap();
        assert_eq!(tabela.regras[0].descricao, "Carne bovina");
    }

    #[test]
    fn percentual_ilegivel_registrado() {
        let csv = "NCM;Aliquota\n10063021;dezoito\n";
        let tabela = extrair_regras_csv(csv.as_bytes(), arquivo()).unwrap();

        assert_eq!(tabela.regras[0].aliquota, Some(Decimal::ZERO));
        assert_eq!(tabela.format_issues[0].campo, "linha[2].aliquota");
    }

    #[test]
    fn colunas_invalidas() {
        let sem_ncm = extrair_regras_csv(b"Produto;Aliquota\nArroz;18\n", arquivo()).unwrap_err();
        assert!(matches!(sem_ncm, FiscalError::MissingEssentialColumn { .. }));

        let repetida = extrair_regras_csv(b"NCM;ncm\n1;2\n", arquivo()).unwrap_err();
        assert!(matches!(repetida, FiscalError::DuplicateColumnName { .. }));

        let em_branco = extrair_regras_csv(b"NCM;;UF\n1;2;3\n", arquivo()).unwrap_err();
        assert!(matches!(em_branco, FiscalError::EmptyColumnName { .. }));
    }

    #[test]
    fn celulas_numericas_com_virgula() {
        assert_eq!(texto_celula(&Data::Float(61.11)), "61,11");
        assert_eq!(texto_celula(&Data::Int(18)), "18");
        assert_eq!(texto_celula(&Data::Empty), "");
    }

    #[test]
    fn ncm_numerico_recupera_zero_a_esquerda() {
        let cabecalho = vec!["NCM".to_string(), "Alíquota".to_string()];
        let linhas = vec![
            vec![texto_celula(&Data::Float(2013000.0)), texto_celula(&Data::Int(12))],
            vec![texto_celula(&Data::Int(4012010)), String::new()],
            vec!["10063021".to_string(), String::new()],
        ];

        let tabela = montar_tabela(&cabecalho, linhas.into_iter(), arquivo()).unwrap();
        let ncms: Vec<&str> = tabela.regras.iter().map(|r| r.ncm.as_str()).collect();
        assert_eq!(ncms, ["02013000", "04012010", "10063021"]);
        assert!(tabela.format_issues.is_empty());
    }

    #[test]
    fn planilha_invalida_e_erro_de_planilha() {
        let err = extrair_regras_planilha(b"PK\x03\x04lixo", Path::new("regras.xlsx")).unwrap_err();
        assert!(matches!(err, FiscalError::Planilha(_)));
    }

    #[test]
    fn linhas_de_beneficio() {
        let texto = "ANEXO I - PRODEPE\n\
                     NCM Descrição Crédito presumido\n\
                     1006.30.21 Arroz beneficiado 75 %\n\
                     0201.30.00 Carne bovina desossada 47,5%\n\
                     Página 2 de 10\n";
        let mut coletor = FormatCollector::default();
        let linhas = extrair_beneficios_texto(texto, &mut coletor);

        assert_eq!(linhas.len(), 2);
        assert_eq!(linhas[0].ncm, "10063021");
        assert_eq!(linhas[0].percentual, dec!(75));
        assert_eq!(linhas[1].ncm, "02013000");
        assert_eq!(linhas[1].percentual, dec!(47.5));
    }

    #[test]
    fn programa_pelo_nome() {
        assert_eq!(programa_do_arquivo("Decreto PRODEPE 2024.pdf").as_deref(), Some("PRODEPE"));
        assert_eq!(programa_do_arquivo("incentivo_go.pdf").as_deref(), Some("INCENTIVO"));
        assert_eq!(programa_do_arquivo("relatorio.pdf"), None);
    }

    #[test]
    fn pdf_invalido_e_erro_de_pdf() {
        let err = extrair_beneficios_pdf(b"%PDF-1.4 truncado", Path::new("prodepe.pdf"), &mut FormatCollector::default())
            .unwrap_err();
        assert!(matches!(err, FiscalError::Pdf(_)));
    }
}
