use std::{io, path::PathBuf};
use thiserror::Error;

use crate::{DocumentType, IntegrityReport};

/// Tipo de retorno conveniente para todo o projeto
pub type FiscalResult<T> = Result<T, FiscalError>;

#[derive(Error, Debug)]
pub enum FiscalError {
    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro no processamento CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arquivo <{arquivo}> contém colunas repetidas: <{coluna}>")]
    DuplicateColumnName { arquivo: PathBuf, coluna: String },

    #[error("Arquivo <{arquivo}> contém colunas com nome em branco!")]
    EmptyColumnName { arquivo: PathBuf },

    /// Campo isolado com valor ilegível.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Falha de integridade: o arquivo não pode seguir para a análise semântica.
    #[error(
        "Arquivo reprovado na verificação de integridade!\n\
        Arquivo: {arquivo:?}\n\
        Erros: {}",
        relatorio.erros.join("; ")
    )]
    Integrity {
        arquivo: PathBuf,
        relatorio: Box<IntegrityReport>,
    },

    #[error("Erro de I/O: {0}")]
    Io(#[from] io::Error),

    #[error(
        "Falha ao ler arquivo!\n\
        Arquivo: {arquivo:?}\n\
        {source}"
    )]
    IoReader {
        #[source]
        source: io::Error,
        arquivo: PathBuf,
    },

    #[error("Erro de serialização JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Coluna essencial ausente no arquivo <{arquivo}>: {coluna}")]
    MissingEssentialColumn { arquivo: PathBuf, coluna: String },

    /// Elemento raiz obrigatório ausente: documento irrecuperável.
    #[error("Estrutura obrigatória ausente em {tipo}: elemento <{elemento}> não encontrado")]
    MissingStructure {
        tipo: DocumentType,
        elemento: &'static str,
    },

    #[error("Falha na extração de texto do PDF: {0}")]
    Pdf(String),

    #[error("Erro na leitura da planilha: {0}")]
    Planilha(#[from] calamine::Error),

    #[error(
        "Tipo de documento não suportado: <{0}>\n\
        Tipos aceitos: nfe, cte, nfse, mdfe"
    )]
    UnsupportedDocumentType(String),

    #[error("Tipo de arquivo não suportado: {arquivo:?} ({motivo})")]
    UnsupportedFileType { arquivo: PathBuf, motivo: String },

    #[error("XML malformado: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML com aninhamento acima de {limite} níveis")]
    XmlProfundidade { limite: usize },
}

/// Valor de um único campo que não pôde ser interpretado.
///
/// As rotinas de `locale` devolvem este erro; os parsers o convertem em
/// [`FormatIssue`](crate::FormatIssue) e seguem com o valor padrão.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Valor inválido <{valor}>: {motivo}")]
pub struct FormatError {
    pub valor: String,
    pub motivo: String,
}

impl FormatError {
    pub fn new(valor: impl Into<String>, motivo: impl Into<String>) -> Self {
        Self {
            valor: valor.into(),
            motivo: motivo.into(),
        }
    }
}
