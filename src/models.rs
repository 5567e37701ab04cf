use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;
use std::{fmt, path::Path, str::FromStr};

use crate::FiscalError;

// --- Tipos de Documento e de Arquivo ---

/// Conjunto fechado de documentos XML aceitos pelo parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocumentType {
    /// Nota Fiscal Eletrônica (modelo 55)
    NFe,
    /// Conhecimento de Transporte Eletrônico (modelo 57)
    CTe,
    /// Nota Fiscal de Serviços Eletrônica (padrão ABRASF ou nacional)
    NFSe,
    /// Manifesto Eletrônico de Documentos Fiscais (modelo 58)
    MDFe,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::NFe => "nfe",
            DocumentType::CTe => "cte",
            DocumentType::NFSe => "nfse",
            DocumentType::MDFe => "mdfe",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nome = match self {
            DocumentType::NFe => "NF-e",
            DocumentType::CTe => "CT-e",
            DocumentType::NFSe => "NFS-e",
            DocumentType::MDFe => "MDF-e",
        };
        f.write_str(nome)
    }
}

impl FromStr for DocumentType {
    type Err = FiscalError;

    /// Aceita a sigla ou o nome descritivo do tipo (sem distinção de caixa).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "nfe" | "invoice" => Ok(DocumentType::NFe),
            "cte" | "transportmanifest" => Ok(DocumentType::CTe),
            "nfse" | "serviceinvoice" => Ok(DocumentType::NFSe),
            "mdfe" | "cargomanifest" => Ok(DocumentType::MDFe),
            _ => Err(FiscalError::UnsupportedDocumentType(s.to_string())),
        }
    }
}

/// Categoria do arquivo, determinada pela extensão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Xml,
    Sped,
    Pdf,
    Planilha,
    Csv,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(FileKind::Xml),
            "txt" => Some(FileKind::Sped),
            "pdf" => Some(FileKind::Pdf),
            "xlsx" | "xls" => Some(FileKind::Planilha),
            "csv" => Some(FileKind::Csv),
            _ => None,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nome = match self {
            FileKind::Xml => "XML",
            FileKind::Sped => "SPED",
            FileKind::Pdf => "PDF",
            FileKind::Planilha => "Planilha",
            FileKind::Csv => "CSV",
        };
        f.write_str(nome)
    }
}

// --- Documento Fiscal Normalizado ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    #[default]
    Authorized,
    Cancelled,
    Denied,
}

/// Identificação fiscal de pessoa jurídica ou física (mutuamente exclusivas).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "tipo", content = "numero", rename_all = "lowercase")]
pub enum TaxId {
    Cnpj(String),
    Cpf(String),
}

impl TaxId {
    pub fn numero(&self) -> &str {
        match self {
            TaxId::Cnpj(n) | TaxId::Cpf(n) => n,
        }
    }
}

/// Emitente, destinatário, prestador ou tomador.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Party {
    pub documento: Option<TaxId>,
    pub nome: String,
    pub inscricao_estadual: String,
    pub uf: String,
}

impl Party {
    pub fn cnpj(&self) -> Option<&str> {
        match &self.documento {
            Some(TaxId::Cnpj(n)) => Some(n),
            _ => None,
        }
    }

    /// Número do documento, ou string vazia quando ausente.
    pub fn documento_str(&self) -> &str {
        self.documento.as_ref().map(TaxId::numero).unwrap_or_default()
    }
}

/// Par base/alíquota/valor de um tributo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaxAmount {
    pub base_calculo: Decimal,
    pub aliquota: Decimal,
    pub valor: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub numero: u32,
    pub codigo: String,
    pub descricao: String,
    pub ncm: String,
    pub cfop: String,
    pub quantidade: Decimal,
    pub valor_unitario: Decimal,
    pub valor_total: Decimal,
    pub cst: String,
    pub icms: Option<TaxAmount>,
    pub ipi: Option<TaxAmount>,
    pub pis: Option<TaxAmount>,
    pub cofins: Option<TaxAmount>,
    /// Somente NFS-e.
    pub iss: Option<TaxAmount>,
}

/// Totais do cabeçalho. Nunca derivados da soma dos itens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaxTotals {
    pub valor_produtos: Decimal,
    pub base_icms: Decimal,
    pub valor_icms: Decimal,
    pub valor_ipi: Decimal,
    pub valor_pis: Decimal,
    pub valor_cofins: Decimal,
    pub valor_iss: Decimal,
    pub valor_frete: Decimal,
    pub valor_desconto: Decimal,
}

/// Campo lido com valor ilegível e substituído pelo padrão (zero ou vazio).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatIssue {
    pub campo: String,
    pub valor: String,
    pub motivo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedFiscalDocument {
    pub tipo: DocumentType,
    pub numero: String,
    pub serie: String,
    pub data_emissao: Option<DateTime<FixedOffset>>,
    pub valor_total: Decimal,
    pub emitente: Party,
    pub destinatario: Party,
    pub itens: Vec<LineItem>,
    pub totais: TaxTotals,
    pub chave_acesso: String,
    pub status: AuthorizationStatus,
    pub observacoes: Option<String>,
    pub format_issues: Vec<FormatIssue>,
}

impl ParsedFiscalDocument {
    pub fn new(tipo: DocumentType) -> Self {
        Self {
            tipo,
            numero: String::new(),
            serie: String::new(),
            data_emissao: None,
            valor_total: Decimal::ZERO,
            emitente: Party::default(),
            destinatario: Party::default(),
            itens: Vec::new(),
            totais: TaxTotals::default(),
            chave_acesso: String::new(),
            status: AuthorizationStatus::default(),
            observacoes: None,
            format_issues: Vec::new(),
        }
    }
}

// --- Resultados de Validação ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub campo: String,
    pub valido: bool,
    pub mensagem: String,
    pub severidade: Severity,
}

impl ValidationResult {
    /// Verificação aprovada: sempre de severidade informativa.
    pub fn ok(campo: impl Into<String>, mensagem: impl Into<String>) -> Self {
        Self {
            campo: campo.into(),
            valido: true,
            mensagem: mensagem.into(),
            severidade: Severity::Info,
        }
    }

    pub fn falha(
        campo: impl Into<String>,
        mensagem: impl Into<String>,
        severidade: Severity,
    ) -> Self {
        Self {
            campo: campo.into(),
            valido: false,
            mensagem: mensagem.into(),
            severidade,
        }
    }

    pub fn is_error(&self) -> bool {
        !self.valido && self.severidade == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        !self.valido && self.severidade == Severity::Warning
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marca = match (self.valido, self.severidade) {
            (true, _) => "OK",
            (false, Severity::Error) => "ERRO",
            (false, Severity::Warning) => "AVISO",
            (false, Severity::Info) => "INFO",
        };
        write!(f, "[{marca}] {}: {}", self.campo, self.mensagem)
    }
}
