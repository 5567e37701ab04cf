//! Verificação de integridade do arquivo antes da análise semântica.
//!
//! Etapas, nesta ordem:
//! 1. tamanho (vazio ou acima do teto absoluto: erro, sem calcular o hash);
//! 2. hash BLAKE3 dos mesmos bytes que seguem para a leitura;
//! 3. teto de tamanho por tipo e estrutura mínima por tipo;
//! 4. varredura heurística (CNPJ, datas, valores): somente avisos;
//! 5. sanidade estrutural leve de XML e SPED: somente avisos.

use serde::Serialize;
use std::{fs, path::Path};
use regex::Regex;
use tracing::{debug, warn};

use crate::{
    FileKind, FiscalError, FiscalResult, RE_CNPJ_FORMATO, RE_DATA_FORMATO, RE_VALOR_MONETARIO,
    decodificar_texto,
};

const MB: u64 = 1024 * 1024;

/// Tetos de tamanho, em bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IntegrityLimits {
    pub absoluto: u64,
    pub pdf: u64,
    pub sped: u64,
    pub xml: u64,
    pub planilha: u64,
    pub csv: u64,
}

impl Default for IntegrityLimits {
    fn default() -> Self {
        IntegrityLimits {
            absoluto: 100 * MB,
            pdf: 20 * MB,
            sped: 50 * MB,
            xml: 10 * MB,
            planilha: 15 * MB,
            csv: 15 * MB,
        }
    }
}

impl IntegrityLimits {
    pub fn teto(&self, tipo: FileKind) -> u64 {
        match tipo {
            FileKind::Pdf => self.pdf,
            FileKind::Sped => self.sped,
            FileKind::Xml => self.xml,
            FileKind::Planilha => self.planilha,
            FileKind::Csv => self.csv,
        }
    }
}

/// Resultado da varredura heurística.
///
/// As contagens incluem repetições; as listas guardam ocorrências distintas,
/// na ordem em que aparecem, até [`AMOSTRAS_HEURISTICA`] por categoria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityMetadata {
    pub tamanho_bytes: u64,
    pub tipo: Option<FileKind>,
    pub cnpjs_encontrados: usize,
    pub datas_encontradas: usize,
    pub valores_encontrados: usize,
    pub cnpjs: Vec<String>,
    pub datas: Vec<String>,
    pub valores: Vec<String>,
}

pub const AMOSTRAS_HEURISTICA: usize = 20;

/// Total de ocorrências e as primeiras ocorrências distintas.
fn varrer(re: &Regex, texto: &str) -> (usize, Vec<String>) {
    let mut total = 0;
    let mut distintos: Vec<String> = Vec::new();

    for m in re.find_iter(texto) {
        total += 1;
        let valor = m.as_str().trim();
        if distintos.len() < AMOSTRAS_HEURISTICA && !distintos.iter().any(|d| d == valor) {
            distintos.push(valor.to_string());
        }
    }

    (total, distintos)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub arquivo: String,
    pub valido: bool,
    pub erros: Vec<String>,
    pub avisos: Vec<String>,
    /// Ausente quando o arquivo foi rejeitado antes do cálculo.
    pub checksum: Option<String>,
    pub metadata: IntegrityMetadata,
}

impl IntegrityReport {
    fn new(arquivo: &str, tamanho: u64, tipo: Option<FileKind>) -> Self {
        IntegrityReport {
            arquivo: arquivo.to_string(),
            valido: true,
            erros: Vec::new(),
            avisos: Vec::new(),
            checksum: None,
            metadata: IntegrityMetadata {
                tamanho_bytes: tamanho,
                tipo,
                ..Default::default()
            },
        }
    }

    fn erro(&mut self, mensagem: impl Into<String>) {
        self.valido = false;
        self.erros.push(mensagem.into());
    }

    fn aviso(&mut self, mensagem: impl Into<String>) {
        self.avisos.push(mensagem.into());
    }

    /// Etapa 1: vazio ou acima do teto absoluto.
    fn verificar_tamanho(&mut self, limites: &IntegrityLimits) -> bool {
        let tamanho = self.metadata.tamanho_bytes;

        if tamanho == 0 {
            self.erro("arquivo vazio");
        } else if tamanho > limites.absoluto {
            self.erro(format!(
                "arquivo com {tamanho} bytes excede o limite absoluto de {} bytes",
                limites.absoluto
            ));
        }

        self.valido
    }

    /// Etapa 3 (parte): teto do tipo, independente do teto absoluto.
    fn verificar_teto_do_tipo(&mut self, limites: &IntegrityLimits) -> bool {
        match self.metadata.tipo {
            Some(tipo) => {
                let teto = limites.teto(tipo);
                if self.metadata.tamanho_bytes > teto {
                    self.erro(format!(
                        "arquivo {tipo} com {} bytes excede o limite de {teto} bytes",
                        self.metadata.tamanho_bytes
                    ));
                }
            }
            None => self.aviso("extensão não reconhecida; verificação estrutural não realizada"),
        }

        self.valido
    }

    /// Etapas 3 a 5 sobre o conteúdo.
    fn verificar_conteudo(&mut self, bytes: &[u8]) {
        match self.metadata.tipo {
            Some(FileKind::Xml) => {
                let texto = decodificar_texto(bytes);
                self.estrutura_xml(&texto);
                self.varredura_heuristica(&texto);
            }
            Some(FileKind::Sped) => {
                let texto = decodificar_texto(bytes);
                self.estrutura_sped(&texto);
                self.varredura_heuristica(&texto);
            }
            Some(FileKind::Csv) => {
                let texto = decodificar_texto(bytes);
                self.estrutura_csv(&texto);
            }
            Some(FileKind::Pdf) => {
                if !bytes.starts_with(ASSINATURA_PDF) {
                    self.erro("assinatura %PDF- ausente: o arquivo não é um PDF");
                }
            }
            Some(FileKind::Planilha) => {
                if !ASSINATURAS_PLANILHA.iter().any(|a| bytes.starts_with(a)) {
                    self.erro("assinatura de planilha (ZIP/OLE2) ausente");
                }
            }
            None => {}
        }
    }

    fn estrutura_xml(&mut self, texto: &str) {
        let declaracao = texto.trim_start().starts_with("<?xml");
        let raiz_conhecida = RAIZES_XML.iter().any(|r| texto.contains(r));

        if !declaracao && !raiz_conhecida {
            self.erro("XML sem declaração e sem elemento raiz fiscal reconhecido");
            return;
        }

        if !TAGS_TIPICAS_XML.iter().any(|t| texto.contains(t)) {
            self.aviso("nenhuma tag típica de documento fiscal encontrada");
        }

        let aberturas = texto.matches('<').count();
        let fechamentos = texto.matches('>').count();
        if aberturas.abs_diff(fechamentos) > TOLERANCIA_SINAIS_XML {
            self.aviso(format!(
                "contagem de '<' ({aberturas}) e '>' ({fechamentos}) diverge"
            ));
        }
    }

    fn estrutura_sped(&mut self, texto: &str) {
        let linhas: Vec<&str> = texto
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let aberto = linhas
            .iter()
            .any(|l| REGISTROS_ABERTURA_SPED.iter().any(|r| l.starts_with(r)));
        if !aberto {
            self.erro(format!(
                "nenhum registro de abertura encontrado ({})",
                REGISTROS_ABERTURA_SPED.join(", ")
            ));
            return;
        }

        let encerrado = linhas
            .iter()
            .rev()
            .take(LINHAS_FINAIS_SPED)
            .any(|l| l.starts_with("|9999|"));
        if !encerrado {
            self.aviso("registro de encerramento |9999| não encontrado no fim do arquivo");
        }

        let fora_do_padrao = linhas.iter().filter(|l| !l.starts_with('|')).count();
        if fora_do_padrao as f64 > linhas.len() as f64 * FRACAO_LINHAS_SPED {
            self.aviso(format!(
                "{fora_do_padrao} de {} linhas não começam com '|'",
                linhas.len()
            ));
        }
    }

    fn estrutura_csv(&mut self, texto: &str) {
        let cabecalho = texto.lines().next().unwrap_or_default();
        if !cabecalho.contains(';') {
            self.aviso("cabeçalho sem delimitador ';'");
        }
    }

    fn varredura_heuristica(&mut self, texto: &str) {
        let meta = &mut self.metadata;
        (meta.cnpjs_encontrados, meta.cnpjs) = varrer(&RE_CNPJ_FORMATO, texto);
        (meta.datas_encontradas, meta.datas) = varrer(&RE_DATA_FORMATO, texto);
        (meta.valores_encontrados, meta.valores) = varrer(&RE_VALOR_MONETARIO, texto);

        if meta.cnpjs_encontrados == 0 {
            self.aviso("nenhum CNPJ encontrado no conteúdo");
        }
    }
}

const ASSINATURA_PDF: &[u8] = b"%PDF-";

const ASSINATURAS_PLANILHA: [&[u8]; 4] = [
    b"PK\x03\x04",
    b"PK\x05\x06",
    b"PK\x07\x08",
    // OLE2 (.xls)
    b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1",
];

const RAIZES_XML: &[&str] = &[
    "nfeProc", "<NFe", "cteProc", "<CTe", "mdfeProc", "<MDFe", "CompNfse", "<Nfse", "<NFSe",
];

const TAGS_TIPICAS_XML: &[&str] = &[
    "infNFe", "infCte", "infMDFe", "InfNfse", "infNFSe", "<ide", "<emit", "<det",
];

const REGISTROS_ABERTURA_SPED: &[&str] = &["|0000|", "|0001|", "|C001|"];

const TOLERANCIA_SINAIS_XML: usize = 4;
const LINHAS_FINAIS_SPED: usize = 5;
const FRACAO_LINHAS_SPED: f64 = 0.1;

fn nome_do_arquivo(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Verifica um arquivo em disco.
///
/// Erros de leitura são propagados; reprovações ficam no relatório
/// (`valido = false`).
pub fn validate_file(path: &Path, limites: &IntegrityLimits) -> FiscalResult<IntegrityReport> {
    ler_e_validar(path, limites).map(|(relatorio, _)| relatorio)
}

/// Como [`validate_file`], devolvendo também o conteúdo lido.
///
/// O arquivo é lido uma única vez, depois da verificação de tamanho; o
/// checksum e as etapas seguintes usam esses mesmos bytes. Sem conteúdo
/// (`None`) quando a reprovação acontece antes da leitura.
pub fn ler_e_validar(
    path: &Path,
    limites: &IntegrityLimits,
) -> FiscalResult<(IntegrityReport, Option<Vec<u8>>)> {
    let ler_erro = |source| FiscalError::IoReader {
        source,
        arquivo: path.to_path_buf(),
    };

    let nome = nome_do_arquivo(path);
    let tamanho = fs::metadata(path).map_err(ler_erro)?.len();
    let mut relatorio = IntegrityReport::new(&nome, tamanho, FileKind::from_path(path));

    // 1. Tamanho, antes de carregar o conteúdo
    if !relatorio.verificar_tamanho(limites) {
        warn!(arquivo = %relatorio.arquivo, erros = ?relatorio.erros, "arquivo rejeitado");
        return Ok((relatorio, None));
    }

    // 2. a 5. sobre os bytes efetivamente lidos
    let bytes = fs::read(path).map_err(ler_erro)?;
    let relatorio = validate_bytes(&nome, &bytes, limites);

    Ok((relatorio, Some(bytes)))
}

/// Igual a [`validate_file`], para conteúdo já em memória.
pub fn validate_bytes(nome: &str, bytes: &[u8], limites: &IntegrityLimits) -> IntegrityReport {
    let tipo = FileKind::from_path(Path::new(nome));
    let mut relatorio = IntegrityReport::new(nome, bytes.len() as u64, tipo);

    if !relatorio.verificar_tamanho(limites) {
        warn!(arquivo = %relatorio.arquivo, erros = ?relatorio.erros, "arquivo rejeitado");
        return relatorio;
    }

    relatorio.checksum = Some(blake3::hash(bytes).to_hex().to_string());

    if relatorio.verificar_teto_do_tipo(limites) {
        relatorio.verificar_conteudo(bytes);
    }

    registrar(&relatorio);
    relatorio
}

fn registrar(relatorio: &IntegrityReport) {
    if relatorio.valido {
        debug!(
            arquivo = %relatorio.arquivo,
            avisos = relatorio.avisos.len(),
            checksum = relatorio.checksum.as_deref().unwrap_or_default(),
            "integridade verificada"
        );
    } else {
        warn!(arquivo = %relatorio.arquivo, erros = ?relatorio.erros, "arquivo rejeitado");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPED: &str = "|0000|017|0|01012024|31012024|EMPRESA|11222333000181||SP|123456789|\n|9999|2|\n";

    #[test]
    fn vazio_rejeitado_sem_checksum() {
        let r = validate_bytes("nota.xml", b"", &IntegrityLimits::default());
        assert!(!r.valido);
        assert_eq!(r.checksum, None);
        assert_eq!(r.erros, ["arquivo vazio"]);
    }

    #[test]
    fn teto_absoluto_antes_do_checksum() {
        let limites = IntegrityLimits {
            absoluto: 10,
            ..Default::default()
        };
        let r = validate_bytes("efd.txt", SPED.as_bytes(), &limites);
        assert!(!r.valido);
        assert_eq!(r.checksum, None);
    }

    #[test]
    fn teto_do_tipo_rejeita_arquivo_bem_formado() {
        let limites = IntegrityLimits {
            sped: 16,
            ..Default::default()
        };
        let r = validate_bytes("efd.txt", SPED.as_bytes(), &limites);
        assert!(!r.valido);
        assert!(r.checksum.is_some());
        assert!(r.erros[0].contains("SPED"));
    }

    #[test]
    fn pdf_sem_assinatura() {
        let r = validate_bytes("beneficio.pdf", b"isto nao e um pdf", &IntegrityLimits::default());
        assert!(!r.valido);

        let ok = validate_bytes("beneficio.pdf", b"%PDF-1.7\n...", &IntegrityLimits::default());
        assert!(ok.valido);
    }

    #[test]
    fn planilha_zip_ou_ole2() {
        let limites = IntegrityLimits::default();
        assert!(validate_bytes("regras.xlsx", b"PK\x03\x04resto", &limites).valido);
        assert!(validate_bytes("regras.xls", b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1resto", &limites).valido);
        assert!(!validate_bytes("regras.xlsx", b"ncm;aliquota", &limites).valido);
    }

    #[test]
    fn sped_valido_e_avisos() {
        let limites = IntegrityLimits::default();
        let r = validate_bytes("efd.txt", SPED.as_bytes(), &limites);
        assert!(r.valido, "{:?}", r.erros);
        assert!(r.avisos.is_empty(), "{:?}", r.avisos);
        assert_eq!(r.metadata.cnpjs_encontrados, 1);
        assert_eq!(r.metadata.cnpjs, ["11222333000181"]);

        let sem_encerramento = validate_bytes("efd.txt", SPED.replace("|9999|2|\n", "").as_bytes(), &limites);
        assert!(sem_encerramento.valido);
        assert_eq!(sem_encerramento.avisos.len(), 1);

        let sem_abertura = validate_bytes("efd.txt", b"|C100|0|\n|9999|1|\n", &limites);
        assert!(!sem_abertura.valido);

        let bloco_c = validate_bytes("efd.txt", b"|C001|0|\n|C100|0|\n|9999|2|\n", &limites);
        assert!(bloco_c.valido, "{:?}", bloco_c.erros);
    }

    #[test]
    fn varredura_guarda_ocorrencias_distintas() {
        let texto = "Emitente 11.222.333/0001-81 em 15/01/2024, total R$ 1.234,56.\n\
                     Destinatário 12345678000195; emitente 11.222.333/0001-81 em 2024-01-16; frete 10,00\n";
        let r = validate_bytes("efd.txt", format!("|0000|{texto}|9999|1|\n").as_bytes(), &IntegrityLimits::default());
        let meta = &r.metadata;

        assert_eq!(meta.cnpjs_encontrados, 3);
        assert_eq!(meta.cnpjs, ["11.222.333/0001-81", "12345678000195"]);
        assert_eq!(meta.datas, ["15/01/2024", "2024-01-16"]);
        assert_eq!(meta.valores, ["R$ 1.234,56", "10,00"]);

        let muitos: String = (0..AMOSTRAS_HEURISTICA + 5).map(|i| format!("01/01/{} ", 2000 + i)).collect();
        let (total, distintos) = varrer(&RE_DATA_FORMATO, &muitos);
        assert_eq!(total, AMOSTRAS_HEURISTICA + 5);
        assert_eq!(distintos.len(), AMOSTRAS_HEURISTICA);
    }

    #[test]
    fn xml_raiz_e_sinais() {
        let limites = IntegrityLimits::default();

        let sem_raiz = validate_bytes("nota.xml", b"<html><body/></html>", &limites);
        assert!(!sem_raiz.valido);

        let xml = "<?xml version=\"1.0\"?><nfeProc><NFe><infNFe><emit><CNPJ>11222333000181</CNPJ></emit></infNFe></NFe></nfeProc>";
        let ok = validate_bytes("nota.xml", xml.as_bytes(), &limites);
        assert!(ok.valido);
        assert!(ok.avisos.is_empty(), "{:?}", ok.avisos);

        let desbalanceado = format!("{xml}{}", "<".repeat(10));
        let aviso = validate_bytes("nota.xml", desbalanceado.as_bytes(), &limites);
        assert!(aviso.valido);
        assert!(aviso.avisos.iter().any(|a| a.contains("diverge")));
    }

    #[test]
    fn arquivo_em_disco() {
        let dir = tempfile::tempdir().unwrap();
        let limites = IntegrityLimits::default();

        let vazio = dir.path().join("vazio.xml");
        fs::write(&vazio, b"").unwrap();
        let r = validate_file(&vazio, &limites).unwrap();
        assert!(!r.valido);
        assert_eq!(r.checksum, None);

        let efd = dir.path().join("efd.txt");
        fs::write(&efd, SPED).unwrap();
        let r = validate_file(&efd, &limites).unwrap();
        assert!(r.valido);
        assert_eq!(r.checksum, Some(blake3::hash(SPED.as_bytes()).to_hex().to_string()));
        assert_eq!(r.arquivo, "efd.txt");

        let (relatorio, bytes) = ler_e_validar(&efd, &limites).unwrap();
        assert_eq!(relatorio.checksum, r.checksum);
        assert_eq!(bytes.as_deref(), Some(SPED.as_bytes()));
        assert_eq!(ler_e_validar(&vazio, &limites).unwrap().1, None);

        let inexistente = validate_file(&dir.path().join("nada.xml"), &limites);
        assert!(matches!(inexistente, Err(FiscalError::IoReader { .. })));
    }
}
