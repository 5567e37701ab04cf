//! Orquestração: roteamento por extensão, verificação de integridade,
//! leitura pelo parser adequado, validação semântica e montagem do envelope
//! [`ParsedDocument`].

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info};

use crate::{
    AlvoValidacao, ApuracaoItem, BeneficioFiscal, ConsolidatedItem, DocumentType, FileKind,
    FiscalError, FiscalResult, FormatCollector, FormatIssue, IntegrityLimits, IntegrityReport,
    ParsedFiscalDocument, REGEX_PROGRAMA_BENEFICIO, REGEX_TABELA_REGRAS, SpedDocument, TabelaRegras,
    TaxId, ValidationResult, XmlElement, consolidar_apuracao, consolidar_itens,
    extrair_beneficios_pdf, extrair_regras_csv, extrair_regras_planilha, ler_e_validar, ler_sped,
    parse_documento, validar_documento, validate_bytes, verificar_referencias,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserConfig {
    pub limites: IntegrityLimits,
    pub versao_parser: String,
    /// Anexa as verificações contra as tabelas de referência.
    pub verificar_referencias: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            limites: IntegrityLimits::default(),
            versao_parser: env!("CARGO_PKG_VERSION").to_string(),
            verificar_referencias: true,
        }
    }
}

// --- Envelope ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DadosEmpresa {
    pub cnpj: String,
    pub razao_social: String,
    pub inscricao_estadual: String,
    pub uf: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DadosSped {
    pub documento: SpedDocument,
    pub itens: Vec<ConsolidatedItem>,
    pub apuracao: Vec<ApuracaoItem>,
    /// Campos padronizados durante a consolidação.
    pub format_issues: Vec<FormatIssue>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "formato", rename_all = "snake_case")]
pub enum DadosFiscais {
    Xml(ParsedFiscalDocument),
    Sped(DadosSped),
    TabelaRegras(TabelaRegras),
    Beneficio(BeneficioFiscal),
}

impl DadosFiscais {
    /// Campos lidos com valor ilegível e substituídos pelo padrão.
    pub fn format_issues(&self) -> Vec<&FormatIssue> {
        match self {
            DadosFiscais::Xml(doc) => doc.format_issues.iter().collect(),
            DadosFiscais::Sped(sped) => sped
                .documento
                .format_issues
                .iter()
                .chain(&sped.format_issues)
                .collect(),
            DadosFiscais::TabelaRegras(tabela) => tabela.format_issues.iter().collect(),
            DadosFiscais::Beneficio(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadadosDocumento {
    pub tamanho_bytes: u64,
    pub checksum: String,
    pub tempo_processamento_ms: u64,
    pub versao_parser: String,
    pub avisos_integridade: Vec<String>,
    pub campos_padronizados: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
    /// Identificador sintético: nome do arquivo + instante + sufixo aleatório.
    /// Duas leituras do mesmo arquivo geram identificadores distintos.
    pub id: String,
    pub nome_arquivo: String,
    pub tipo_arquivo: FileKind,
    pub dados_empresa: DadosEmpresa,
    pub dados_fiscais: DadosFiscais,
    pub validacoes: Vec<ValidationResult>,
    pub metadata: MetadadosDocumento,
    pub extraido_em: DateTime<Utc>,
}

impl ParsedDocument {
    pub fn erros(&self) -> impl Iterator<Item = &ValidationResult> {
        self.validacoes.iter().filter(|v| v.is_error())
    }

    pub fn avisos(&self) -> impl Iterator<Item = &ValidationResult> {
        self.validacoes.iter().filter(|v| v.is_warning())
    }

    /// Sem erros: apto ao cálculo de tributos, independentemente de avisos.
    pub fn aceitavel(&self) -> bool {
        self.erros().next().is_none()
    }
}

// --- Orquestrador ---

#[derive(Debug, Clone, Default)]
pub struct DocumentParser {
    config: ParserConfig,
}

impl DocumentParser {
    pub fn new(config: ParserConfig) -> Self {
        DocumentParser { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Lê, verifica e interpreta um arquivo em disco.
    pub fn parse_document(&self, path: &Path) -> FiscalResult<ParsedDocument> {
        let inicio = Instant::now();
        let nome = nome_do_arquivo(path);

        // 1. Roteamento pela extensão (antes de qualquer leitura)
        let tipo = rotear(&nome)?;

        // 2. Integridade, sobre a única leitura do arquivo
        let (relatorio, bytes) = ler_e_validar(path, &self.config.limites)?;
        exigir_integridade(path, relatorio.clone())?;

        // 3. Conteúdo: relatório aprovado implica bytes lidos
        let bytes = bytes.unwrap_or_default();

        self.processar(&nome, tipo, &bytes, relatorio, inicio)
    }

    /// Igual a [`DocumentParser::parse_document`], com o conteúdo em memória.
    pub fn parse_bytes(&self, nome: &str, bytes: &[u8]) -> FiscalResult<ParsedDocument> {
        let inicio = Instant::now();
        let tipo = rotear(nome)?;

        let relatorio = validate_bytes(nome, bytes, &self.config.limites);
        exigir_integridade(Path::new(nome), relatorio.clone())?;

        self.processar(nome, tipo, bytes, relatorio, inicio)
    }

    fn processar(
        &self,
        nome: &str,
        tipo: FileKind,
        bytes: &[u8],
        relatorio: IntegrityReport,
        inicio: Instant,
    ) -> FiscalResult<ParsedDocument> {
        let arquivo = Path::new(nome);

        let (dados_empresa, dados_fiscais, validacoes) = match tipo {
            FileKind::Xml => self.processar_xml(nome, bytes)?,
            FileKind::Sped => self.processar_sped(bytes),
            FileKind::Planilha => self.processar_tabela(extrair_regras_planilha(bytes, arquivo)?),
            FileKind::Csv => self.processar_tabela(extrair_regras_csv(bytes, arquivo)?),
            FileKind::Pdf => {
                let mut coletor = FormatCollector::default();
                let beneficio = extrair_beneficios_pdf(bytes, arquivo, &mut coletor)?;
                let alvo = AlvoValidacao::de_ncms(beneficio.linhas.iter().map(|l| l.ncm.as_str()));
                let validacoes = self.validar(&alvo);
                (DadosEmpresa::default(), DadosFiscais::Beneficio(beneficio), validacoes)
            }
        };

        let campos_padronizados = dados_fiscais.format_issues().len();

        let documento = ParsedDocument {
            id: gerar_id(nome),
            nome_arquivo: nome.to_string(),
            tipo_arquivo: tipo,
            dados_empresa,
            dados_fiscais,
            validacoes,
            metadata: MetadadosDocumento {
                tamanho_bytes: relatorio.metadata.tamanho_bytes,
                checksum: relatorio.checksum.unwrap_or_default(),
                tempo_processamento_ms: u64::try_from(inicio.elapsed().as_millis()).unwrap_or(u64::MAX),
                versao_parser: self.config.versao_parser.clone(),
                avisos_integridade: relatorio.avisos,
                campos_padronizados,
            },
            extraido_em: Utc::now(),
        };

        info!(
            arquivo = nome,
            tipo = %tipo,
            validacoes = documento.validacoes.len(),
            erros = documento.erros().count(),
            campos_padronizados,
            "documento processado"
        );

        Ok(documento)
    }

    fn validar(&self, alvo: &AlvoValidacao) -> Vec<ValidationResult> {
        let mut resultados = validar_documento(alvo);
        if self.config.verificar_referencias {
            resultados.extend(verificar_referencias(alvo));
        }
        resultados
    }

    fn processar_xml(
        &self,
        nome: &str,
        bytes: &[u8],
    ) -> FiscalResult<(DadosEmpresa, DadosFiscais, Vec<ValidationResult>)> {
        let raiz = XmlElement::from_bytes(bytes)?;
        let tipo = inferir_tipo_xml(&raiz, nome)?;
        let doc = parse_documento(&raiz, tipo)?;

        let validacoes = self.validar(&AlvoValidacao::from(&doc));

        let empresa = DadosEmpresa {
            cnpj: doc.emitente.documento_str().to_string(),
            razao_social: doc.emitente.nome.clone(),
            inscricao_estadual: doc.emitente.inscricao_estadual.clone(),
            uf: doc.emitente.uf.clone(),
        };

        Ok((empresa, DadosFiscais::Xml(doc), validacoes))
    }

    fn processar_sped(&self, bytes: &[u8]) -> (DadosEmpresa, DadosFiscais, Vec<ValidationResult>) {
        let documento = ler_sped(bytes);

        let mut coletor = FormatCollector::default();
        let itens = consolidar_itens(&documento, &mut coletor);
        let apuracao = consolidar_apuracao(&documento, &mut coletor);

        let cnpj = Some(documento.empresa.cnpj.trim())
            .filter(|c| !c.is_empty())
            .map(|c| TaxId::Cnpj(c.to_string()));

        let validacoes = self.validar(&AlvoValidacao::de_sped(&documento, cnpj.as_ref(), &itens));

        let empresa = DadosEmpresa {
            cnpj: documento.empresa.cnpj.clone(),
            razao_social: documento.empresa.nome.clone(),
            inscricao_estadual: documento.empresa.inscricao_estadual.clone(),
            uf: documento.empresa.uf.clone(),
        };

        let dados = DadosSped {
            documento,
            itens,
            apuracao,
            format_issues: coletor.into_issues(),
        };

        (empresa, DadosFiscais::Sped(dados), validacoes)
    }

    fn processar_tabela(&self, tabela: TabelaRegras) -> (DadosEmpresa, DadosFiscais, Vec<ValidationResult>) {
        let alvo = AlvoValidacao::de_ncms(tabela.regras.iter().map(|r| r.ncm.as_str()));
        let validacoes = self.validar(&alvo);
        (DadosEmpresa::default(), DadosFiscais::TabelaRegras(tabela), validacoes)
    }
}

fn nome_do_arquivo(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn nao_suportado(nome: &str, motivo: &str) -> FiscalError {
    FiscalError::UnsupportedFileType {
        arquivo: PathBuf::from(nome),
        motivo: motivo.to_string(),
    }
}

/// Categoria do arquivo pela extensão. Planilhas, CSV e PDF só são aceitos
/// quando o nome indica tabela de regras ou programa de benefício.
pub fn rotear(nome: &str) -> FiscalResult<FileKind> {
    let tipo = FileKind::from_path(Path::new(nome))
        .ok_or_else(|| nao_suportado(nome, "extensão sem leitor associado"))?;

    match tipo {
        FileKind::Planilha | FileKind::Csv if !REGEX_TABELA_REGRAS.is_match(nome) => Err(nao_suportado(
            nome,
            "o nome do arquivo não indica tabela de regras tributárias",
        )),
        FileKind::Pdf if !REGEX_PROGRAMA_BENEFICIO.is_match(nome) => Err(nao_suportado(
            nome,
            "o nome do arquivo não indica programa de benefício fiscal",
        )),
        _ => {
            debug!(arquivo = nome, tipo = %tipo, "arquivo roteado");
            Ok(tipo)
        }
    }
}

fn exigir_integridade(arquivo: &Path, relatorio: IntegrityReport) -> FiscalResult<()> {
    if relatorio.valido {
        Ok(())
    } else {
        Err(FiscalError::Integrity {
            arquivo: arquivo.to_path_buf(),
            relatorio: Box::new(relatorio),
        })
    }
}

/// Elemento característico de cada tipo. MDF-e e CT-e citam NF-e em seu
/// conteúdo, por isso são procurados antes.
const MARCADORES_XML: [(&[&str], DocumentType); 4] = [
    (&["infMDFe"], DocumentType::MDFe),
    (&["infCte"], DocumentType::CTe),
    (&["InfNfse", "CompNfse", "infNFSe"], DocumentType::NFSe),
    (&["infNFe"], DocumentType::NFe),
];

/// Tipo do XML pelo conteúdo; na falta de marcador, pelo nome do arquivo.
pub fn inferir_tipo_xml(raiz: &XmlElement, nome: &str) -> FiscalResult<DocumentType> {
    if let Some((_, tipo)) = MARCADORES_XML
        .iter()
        .find(|(tags, _)| raiz.find_any(tags).is_some())
    {
        return Ok(*tipo);
    }

    let nome_min = nome.to_lowercase();
    [
        ("mdfe", DocumentType::MDFe),
        ("nfse", DocumentType::NFSe),
        ("cte", DocumentType::CTe),
        ("nfe", DocumentType::NFe),
    ]
    .into_iter()
    .find(|(dica, _)| nome_min.contains(dica))
    .map(|(_, tipo)| tipo)
    .ok_or_else(|| FiscalError::UnsupportedDocumentType(nome.to_string()))
}

fn gerar_id(nome: &str) -> String {
    let base: String = Path::new(nome)
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(40)
        .collect();

    let mut rng = rand::rng();
    format!(
        "{base}_{}_{:06}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        rng.random_range(0..999999)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roteamento_por_extensao_e_nome() {
        assert_eq!(rotear("nota.XML").unwrap(), FileKind::Xml);
        assert_eq!(rotear("EFD_2024.txt").unwrap(), FileKind::Sped);
        assert_eq!(rotear("tabela_ncm.xlsx").unwrap(), FileKind::Planilha);
        assert_eq!(rotear("regras_sp.csv").unwrap(), FileKind::Csv);
        assert_eq!(rotear("Anexo PRODEPE.pdf").unwrap(), FileKind::Pdf);

        for nome in ["foto.png", "sem_extensao", "vendas.xlsx", "contrato.pdf"] {
            let err = rotear(nome).unwrap_err();
            assert!(matches!(err, FiscalError::UnsupportedFileType { .. }), "{nome}");
        }
    }

    #[test]
    fn tipo_xml_pelo_conteudo() {
        let casos = [
            ("<nfeProc><NFe><infNFe/></NFe></nfeProc>", DocumentType::NFe),
            ("<cteProc><CTe><infCte><infDoc><infNFe/></infDoc></infCte></CTe></cteProc>", DocumentType::CTe),
            ("<mdfeProc><MDFe><infMDFe><infCTe/></infMDFe></MDFe></mdfeProc>", DocumentType::MDFe),
            ("<CompNfse><Nfse><InfNfse/></Nfse></CompNfse>", DocumentType::NFSe),
        ];
        for (xml, esperado) in casos {
            let raiz = XmlElement::parse(xml).unwrap();
            assert_eq!(inferir_tipo_xml(&raiz, "arquivo.xml").unwrap(), esperado, "{xml}");
        }
    }

    #[test]
    fn tipo_xml_pelo_nome() {
        let raiz = XmlElement::parse("<documento/>").unwrap();
        assert_eq!(inferir_tipo_xml(&raiz, "CTe_123.xml").unwrap(), DocumentType::CTe);
        assert_eq!(inferir_tipo_xml(&raiz, "nfse-456.xml").unwrap(), DocumentType::NFSe);

        let err = inferir_tipo_xml(&raiz, "documento.xml").unwrap_err();
        assert!(matches!(err, FiscalError::UnsupportedDocumentType(_)));
    }

    #[test]
    fn identificadores_distintos_para_o_mesmo_arquivo() {
        let a = gerar_id("NFe 35240111222333000181.xml");
        let b = gerar_id("NFe 35240111222333000181.xml");
        assert!(a.starts_with("NFe_35240111222333000181_"));
        assert_ne!(a, b);
    }

    #[test]
    fn integridade_reprovada_interrompe() {
        let parser = DocumentParser::default();
        let err = parser.parse_bytes("nota.xml", b"").unwrap_err();
        assert!(matches!(err, FiscalError::Integrity { .. }));
    }
}
