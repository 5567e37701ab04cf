//! Leitura de arquivos SPED (EFD ICMS/IPI e EFD Contribuições) e
//! consolidação dos registros de documento (cabeçalho + itens) e de apuração.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use std::{collections::HashMap, fmt};
use tracing::{debug, warn};

use crate::{FormatCollector, FormatIssue, decodificar_texto, somente_digitos};

// --- Variantes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SpedVariant {
    /// EFD ICMS/IPI
    Fiscal,
    /// EFD Contribuições (PIS/COFINS)
    Contribuicoes,
}

/// Registros retidos pela EFD ICMS/IPI. Os demais são descartados na leitura.
const REGISTROS_FISCAL: &[&str] = &["0000", "0150", "0200", "C100", "C170", "E110", "E520"];

const REGISTROS_CONTRIBUICOES: &[&str] = &[
    "0000", "0110", "0150", "0200", "A100", "A170", "C100", "C170", "M200", "M600",
];

impl SpedVariant {
    pub fn registros(&self) -> &'static [&'static str] {
        match self {
            SpedVariant::Fiscal => REGISTROS_FISCAL,
            SpedVariant::Contribuicoes => REGISTROS_CONTRIBUICOES,
        }
    }

    fn registro_aceito(&self, tag: &str) -> Option<&'static str> {
        self.registros().iter().find(|&&r| r == tag).copied()
    }

    /// Escolhe a variante pelos registros exclusivos da EFD Contribuições
    /// (`0110`, bloco A e bloco M). Na ausência deles, EFD ICMS/IPI.
    pub fn detectar(texto: &str) -> SpedVariant {
        let contribuicoes = texto.lines().any(|linha| {
            let linha = linha.trim_start();
            linha.starts_with("|0110|")
                || linha.starts_with("|A100|")
                || linha.starts_with("|M200|")
                || linha.starts_with("|M600|")
        });

        if contribuicoes {
            SpedVariant::Contribuicoes
        } else {
            SpedVariant::Fiscal
        }
    }
}

impl fmt::Display for SpedVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpedVariant::Fiscal => f.write_str("EFD ICMS/IPI"),
            SpedVariant::Contribuicoes => f.write_str("EFD Contribuições"),
        }
    }
}

// --- Leiautes por versão ---
//
// Posições seguem a numeração do Guia Prático: campo 01 é o REG.

#[derive(Debug)]
pub struct CamposEmpresa {
    pub cod_ver: usize,
    pub dt_ini: usize,
    pub dt_fin: usize,
    pub nome: usize,
    pub cnpj: usize,
    pub uf: usize,
    pub ie: Option<usize>,
}

#[derive(Debug)]
pub struct CamposCabecalho {
    pub registro: &'static str,
    pub ind_oper: usize,
    pub ind_emit: usize,
    pub cod_part: usize,
    pub serie: usize,
    pub num_doc: usize,
    pub chave: usize,
    pub dt_doc: usize,
    pub vl_doc: usize,
}

#[derive(Debug)]
pub struct CamposDetalhe {
    pub registro: &'static str,
    /// Registro pai ao qual o item se vincula.
    pub cabecalho: &'static str,
    pub num_item: usize,
    pub cod_item: usize,
    pub descricao: usize,
    pub quantidade: Option<usize>,
    pub vl_item: usize,
    pub cst: usize,
    pub cfop: Option<usize>,
    pub vl_bc_icms: Option<usize>,
    pub aliq_icms: Option<usize>,
    pub vl_icms: Option<usize>,
    pub vl_ipi: Option<usize>,
    pub cst_pis: usize,
    pub vl_pis: usize,
    pub cst_cofins: usize,
    pub vl_cofins: usize,
}

#[derive(Debug)]
pub struct CamposApuracao {
    pub registro: &'static str,
    pub tributo: &'static str,
    pub debitos: &'static [usize],
    pub creditos: &'static [usize],
    pub saldo_anterior: Option<usize>,
    pub a_recolher: usize,
    pub saldo_credor: Option<usize>,
}

#[derive(Debug)]
pub struct LeiauteSped {
    pub variante: SpedVariant,
    /// Valores de `COD_VER` do registro 0000 cobertos por este leiaute.
    pub versoes: &'static [&'static str],
    pub empresa: CamposEmpresa,
    pub cabecalhos: &'static [CamposCabecalho],
    pub detalhes: &'static [CamposDetalhe],
    pub apuracao: &'static [CamposApuracao],
}

impl LeiauteSped {
    fn cabecalho(&self, registro: &str) -> Option<&CamposCabecalho> {
        self.cabecalhos.iter().find(|c| c.registro == registro)
    }

    fn detalhe(&self, registro: &str) -> Option<&CamposDetalhe> {
        self.detalhes.iter().find(|d| d.registro == registro)
    }
}

const C100: CamposCabecalho = CamposCabecalho {
    registro: "C100",
    ind_oper: 2,
    ind_emit: 3,
    cod_part: 4,
    serie: 7,
    num_doc: 8,
    chave: 9,
    dt_doc: 10,
    vl_doc: 12,
};

const C170: CamposDetalhe = CamposDetalhe {
    registro: "C170",
    cabecalho: "C100",
    num_item: 2,
    cod_item: 3,
    descricao: 4,
    quantidade: Some(5),
    vl_item: 7,
    cst: 10,
    cfop: Some(11),
    vl_bc_icms: Some(13),
    aliq_icms: Some(14),
    vl_icms: Some(15),
    vl_ipi: Some(24),
    cst_pis: 25,
    vl_pis: 30,
    cst_cofins: 31,
    vl_cofins: 36,
};

const A100: CamposCabecalho = CamposCabecalho {
    registro: "A100",
    ind_oper: 2,
    ind_emit: 3,
    cod_part: 4,
    serie: 6,
    num_doc: 8,
    chave: 9,
    dt_doc: 10,
    vl_doc: 12,
};

const A170: CamposDetalhe = CamposDetalhe {
    registro: "A170",
    cabecalho: "A100",
    num_item: 2,
    cod_item: 3,
    descricao: 4,
    quantidade: None,
    vl_item: 5,
    cst: 9,
    cfop: None,
    vl_bc_icms: None,
    aliq_icms: None,
    vl_icms: None,
    vl_ipi: None,
    cst_pis: 9,
    vl_pis: 12,
    cst_cofins: 13,
    vl_cofins: 16,
};

pub static LEIAUTES: [LeiauteSped; 2] = [
    LeiauteSped {
        variante: SpedVariant::Fiscal,
        versoes: &["013", "014", "015", "016", "017", "018", "019"],
        empresa: CamposEmpresa {
            cod_ver: 2,
            dt_ini: 4,
            dt_fin: 5,
            nome: 6,
            cnpj: 7,
            uf: 9,
            ie: Some(10),
        },
        cabecalhos: &[C100],
        detalhes: &[C170],
        apuracao: &[
            CamposApuracao {
                registro: "E110",
                tributo: "ICMS",
                debitos: &[2],
                creditos: &[6],
                saldo_anterior: Some(10),
                a_recolher: 13,
                saldo_credor: Some(14),
            },
            CamposApuracao {
                registro: "E520",
                tributo: "IPI",
                debitos: &[3],
                creditos: &[4],
                saldo_anterior: Some(2),
                a_recolher: 8,
                saldo_credor: Some(7),
            },
        ],
    },
    LeiauteSped {
        variante: SpedVariant::Contribuicoes,
        versoes: &["003", "004", "005", "006"],
        empresa: CamposEmpresa {
            cod_ver: 2,
            dt_ini: 6,
            dt_fin: 7,
            nome: 8,
            cnpj: 9,
            uf: 10,
            ie: None,
        },
        cabecalhos: &[A100, C100],
        detalhes: &[A170, C170],
        apuracao: &[
            CamposApuracao {
                registro: "M200",
                tributo: "PIS",
                debitos: &[2, 9],
                creditos: &[3, 4],
                saldo_anterior: None,
                a_recolher: 13,
                saldo_credor: None,
            },
            CamposApuracao {
                registro: "M600",
                tributo: "COFINS",
                debitos: &[2, 9],
                creditos: &[3, 4],
                saldo_anterior: None,
                a_recolher: 13,
                saldo_credor: None,
            },
        ],
    },
];

/// Leiaute para a versão informada. Versão desconhecida recebe o leiaute
/// mais recente da variante e `false` no segundo elemento.
pub fn leiaute_para(variante: SpedVariant, cod_ver: &str) -> (&'static LeiauteSped, bool) {
    let mut da_variante = LEIAUTES.iter().filter(|l| l.variante == variante);

    if let Some(leiaute) = da_variante.clone().find(|l| l.versoes.contains(&cod_ver)) {
        return (leiaute, true);
    }

    let mais_recente = da_variante.next_back().unwrap_or(&LEIAUTES[0]);
    (mais_recente, false)
}

// --- Registros e documento ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpedRecord {
    pub registro: &'static str,
    /// Campos na ordem do arquivo; `campos[0]` é o próprio REG.
    pub campos: Vec<String>,
}

impl SpedRecord {
    /// Campo pela numeração do leiaute (01 = REG). Vazio quando ausente.
    pub fn campo(&self, numero: usize) -> &str {
        numero
            .checked_sub(1)
            .and_then(|i| self.campos.get(i))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DadosEmpresaSped {
    pub nome: String,
    pub cnpj: String,
    pub uf: String,
    pub inscricao_estadual: String,
    pub periodo_inicio: Option<NaiveDate>,
    pub periodo_fim: Option<NaiveDate>,
    pub versao_leiaute: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpedDocument {
    pub variante: SpedVariant,
    pub empresa: DadosEmpresaSped,
    pub leiaute_reconhecido: bool,
    pub total_registros: usize,
    #[serde(skip)]
    pub registros: Vec<SpedRecord>,
    #[serde(skip)]
    pub leiaute: &'static LeiauteSped,
    /// COD_PART -> CNPJ (ou CPF) do registro 0150.
    #[serde(skip)]
    pub participantes: HashMap<String, String>,
    /// COD_ITEM -> NCM do registro 0200.
    #[serde(skip)]
    pub ncm_por_item: HashMap<String, String>,
    pub format_issues: Vec<FormatIssue>,
}

/// Divide a linha pelos `|`, descartando apenas os delimitadores das pontas
/// para que campos vazios intermediários mantenham a posição.
fn dividir_campos(linha: &str) -> Vec<String> {
    let corpo = linha.trim();
    let corpo = corpo.strip_prefix('|').unwrap_or(corpo);
    let corpo = corpo.strip_suffix('|').unwrap_or(corpo);

    corpo.split('|').map(|c| c.trim().to_string()).collect()
}

/// Leitura em passagem única. Linhas vazias, registros fora da lista da
/// variante e registros com menos de dois campos são descartados.
pub fn parse_content(texto: &str, variante: SpedVariant) -> SpedDocument {
    let registros: Vec<SpedRecord> = texto
        .lines()
        .filter(|linha| !linha.trim().is_empty())
        .filter_map(|linha| {
            let campos = dividir_campos(linha);
            if campos.len() < 2 {
                return None;
            }
            let registro = variante.registro_aceito(&campos[0])?;
            Some(SpedRecord { registro, campos })
        })
        .collect();

    let cod_ver = registros
        .iter()
        .find(|r| r.registro == "0000")
        .map(|r| r.campo(2).to_string())
        .unwrap_or_default();

    let (leiaute, leiaute_reconhecido) = leiaute_para(variante, &cod_ver);

    if !leiaute_reconhecido {
        warn!(
            variante = %variante,
            cod_ver = %cod_ver,
            versoes = ?leiaute.versoes,
            "versão de leiaute desconhecida; usando o leiaute mais recente"
        );
    }

    let mut coletor = FormatCollector::default();
    let mut empresa = DadosEmpresaSped::default();
    let mut participantes = HashMap::new();
    let mut ncm_por_item = HashMap::new();

    for registro in &registros {
        match registro.registro {
            "0000" => {
                let c = &leiaute.empresa;
                empresa = DadosEmpresaSped {
                    nome: registro.campo(c.nome).to_string(),
                    cnpj: registro.campo(c.cnpj).to_string(),
                    uf: registro.campo(c.uf).to_string(),
                    inscricao_estadual: c.ie.map(|i| registro.campo(i)).unwrap_or_default().to_string(),
                    periodo_inicio: coletor.data("0000.DT_INI", registro.campo(c.dt_ini)),
                    periodo_fim: coletor.data("0000.DT_FIN", registro.campo(c.dt_fin)),
                    versao_leiaute: registro.campo(c.cod_ver).to_string(),
                };
            }
            "0150" => {
                // CNPJ no campo 05; pessoa física no campo 06
                let documento = match registro.campo(5) {
                    "" => registro.campo(6),
                    cnpj => cnpj,
                };
                participantes.insert(registro.campo(2).to_string(), documento.to_string());
            }
            "0200" => {
                ncm_por_item.insert(registro.campo(2).to_string(), registro.campo(8).to_string());
            }
            _ => {}
        }
    }

    debug!(
        variante = %variante,
        registros = registros.len(),
        participantes = participantes.len(),
        itens_cadastrados = ncm_por_item.len(),
        "arquivo SPED lido"
    );

    SpedDocument {
        variante,
        empresa,
        leiaute_reconhecido,
        total_registros: registros.len(),
        registros,
        leiaute,
        participantes,
        ncm_por_item,
        format_issues: coletor.into_issues(),
    }
}

/// Decodifica (UTF-8 ou Latin-1), detecta a variante e lê o arquivo.
pub fn ler_sped(bytes: &[u8]) -> SpedDocument {
    let texto = decodificar_texto(bytes);
    let variante = SpedVariant::detectar(&texto);
    parse_content(&texto, variante)
}

// --- Consolidação de documentos ---

/// Item de documento com os dados do cabeçalho ao qual pertence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidatedItem {
    pub registro: &'static str,
    pub numero_documento: String,
    pub serie: String,
    pub data_documento: Option<NaiveDate>,
    pub chave_acesso: String,
    pub cnpj_emitente: String,
    pub indicador_operacao: String,
    pub valor_documento: Decimal,
    pub numero_item: String,
    pub codigo_item: String,
    pub descricao: String,
    pub ncm: Option<String>,
    pub cfop: Option<String>,
    pub cst: Option<String>,
    pub quantidade: Decimal,
    pub valor_item: Decimal,
    pub base_icms: Decimal,
    pub aliquota_icms: Decimal,
    pub valor_icms: Decimal,
    pub valor_ipi: Decimal,
    pub cst_pis: String,
    pub valor_pis: Decimal,
    pub cst_cofins: String,
    pub valor_cofins: Decimal,
}

/// Dados do cabeçalho vigente durante a consolidação.
#[derive(Debug, Clone)]
struct HeaderContext {
    registro: &'static str,
    numero_documento: String,
    serie: String,
    data_documento: Option<NaiveDate>,
    chave_acesso: String,
    cnpj_emitente: String,
    indicador_operacao: String,
    valor_documento: Decimal,
}

impl SpedDocument {
    /// Emitente do documento: a própria empresa (IND_EMIT = 0), o participante
    /// do 0150 ou, sem cadastro, o COD_PART quando ele já é um CNPJ.
    fn resolver_emitente(&self, ind_emit: &str, cod_part: &str) -> String {
        if ind_emit == "0" {
            return self.empresa.cnpj.clone();
        }
        if let Some(documento) = self.participantes.get(cod_part) {
            return documento.clone();
        }
        let digitos = somente_digitos(cod_part);
        if digitos.len() == 14 {
            digitos.into_owned()
        } else {
            String::new()
        }
    }

    fn contexto(
        &self,
        registro: &SpedRecord,
        campos: &CamposCabecalho,
        c: &mut FormatCollector,
    ) -> HeaderContext {
        let rotulo = |campo: &str| format!("{}.{campo}", registro.registro);

        HeaderContext {
            registro: registro.registro,
            numero_documento: registro.campo(campos.num_doc).to_string(),
            serie: registro.campo(campos.serie).to_string(),
            data_documento: c.data(&rotulo("DT_DOC"), registro.campo(campos.dt_doc)),
            chave_acesso: registro.campo(campos.chave).to_string(),
            cnpj_emitente: self.resolver_emitente(
                registro.campo(campos.ind_emit),
                registro.campo(campos.cod_part),
            ),
            indicador_operacao: registro.campo(campos.ind_oper).to_string(),
            valor_documento: c.decimal(&rotulo("VL_DOC"), registro.campo(campos.vl_doc)),
        }
    }

    fn item(
        &self,
        cabecalho: &HeaderContext,
        registro: &SpedRecord,
        campos: &CamposDetalhe,
        c: &mut FormatCollector,
    ) -> ConsolidatedItem {
        let rotulo = |campo: &str| {
            format!(
                "{}[{}/{}].{campo}",
                registro.registro,
                cabecalho.numero_documento,
                registro.campo(campos.num_item)
            )
        };
        let mut valor = |pos: Option<usize>, campo: &str| match pos {
            Some(p) => c.decimal(&rotulo(campo), registro.campo(p)),
            None => Decimal::ZERO,
        };

        let codigo_item = registro.campo(campos.cod_item).to_string();
        let nao_vazio = |s: &str| (!s.is_empty()).then(|| s.to_string());

        ConsolidatedItem {
            registro: registro.registro,
            numero_documento: cabecalho.numero_documento.clone(),
            serie: cabecalho.serie.clone(),
            data_documento: cabecalho.data_documento,
            chave_acesso: cabecalho.chave_acesso.clone(),
            cnpj_emitente: cabecalho.cnpj_emitente.clone(),
            indicador_operacao: cabecalho.indicador_operacao.clone(),
            valor_documento: cabecalho.valor_documento,
            numero_item: registro.campo(campos.num_item).to_string(),
            descricao: registro.campo(campos.descricao).to_string(),
            ncm: self.ncm_por_item.get(&codigo_item).cloned().filter(|n| !n.is_empty()),
            codigo_item,
            cfop: campos.cfop.and_then(|p| nao_vazio(registro.campo(p))),
            cst: nao_vazio(registro.campo(campos.cst)),
            quantidade: match campos.quantidade {
                Some(_) => valor(campos.quantidade, "QTD"),
                None => Decimal::ONE,
            },
            valor_item: valor(Some(campos.vl_item), "VL_ITEM"),
            base_icms: valor(campos.vl_bc_icms, "VL_BC_ICMS"),
            aliquota_icms: valor(campos.aliq_icms, "ALIQ_ICMS"),
            valor_icms: valor(campos.vl_icms, "VL_ICMS"),
            valor_ipi: valor(campos.vl_ipi, "VL_IPI"),
            cst_pis: registro.campo(campos.cst_pis).to_string(),
            valor_pis: valor(Some(campos.vl_pis), "VL_PIS"),
            cst_cofins: registro.campo(campos.cst_cofins).to_string(),
            valor_cofins: valor(Some(campos.vl_cofins), "VL_COFINS"),
        }
    }
}

/// Consolida os itens de documento em uma única dobra sobre os registros.
///
/// Cada cabeçalho (C100, A100) substitui o anterior; cada item (C170, A170)
/// é emitido com os dados do cabeçalho vigente, desde que seja do mesmo
/// bloco. Item sem cabeçalho vigente é descartado.
pub fn consolidar_itens(doc: &SpedDocument, coletor: &mut FormatCollector) -> Vec<ConsolidatedItem> {
    let leiaute = doc.leiaute;

    let (_, itens) = doc.registros.iter().fold(
        (None::<HeaderContext>, Vec::new()),
        |(vigente, mut itens), registro| {
            if let Some(campos) = leiaute.cabecalho(registro.registro) {
                return (Some(doc.contexto(registro, campos, coletor)), itens);
            }

            if let Some(campos) = leiaute.detalhe(registro.registro) {
                match &vigente {
                    Some(cabecalho) if cabecalho.registro == campos.cabecalho => {
                        itens.push(doc.item(cabecalho, registro, campos, coletor));
                    }
                    _ => debug!(
                        registro = registro.registro,
                        item = registro.campo(campos.num_item),
                        "item sem cabeçalho vigente descartado"
                    ),
                }
            }

            (vigente, itens)
        },
    );

    debug!(itens = itens.len(), "itens SPED consolidados");
    itens
}

// --- Consolidação da apuração ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApuracaoItem {
    pub registro: &'static str,
    pub tributo: &'static str,
    pub debitos: Decimal,
    pub creditos: Decimal,
    pub saldo_credor_anterior: Decimal,
    pub valor_a_recolher: Decimal,
    pub saldo_credor_a_transportar: Decimal,
}

/// Totais de apuração do período (E110, E520, M200, M600). Cada registro
/// é independente dos demais.
pub fn consolidar_apuracao(doc: &SpedDocument, coletor: &mut FormatCollector) -> Vec<ApuracaoItem> {
    doc.registros
        .iter()
        .filter_map(|registro| {
            let campos = doc
                .leiaute
                .apuracao
                .iter()
                .find(|a| a.registro == registro.registro)?;

            let mut soma = |posicoes: &[usize]| -> Decimal {
                posicoes
                    .iter()
                    .map(|&pos| valor_do_campo(coletor, registro, pos))
                    .sum()
            };

            let debitos = soma(campos.debitos);
            let creditos = soma(campos.creditos);
            let saldo_credor_anterior = soma(campos.saldo_anterior.as_slice());
            let valor_a_recolher = soma(&[campos.a_recolher]);
            let saldo_credor_a_transportar = soma(campos.saldo_credor.as_slice());

            Some(ApuracaoItem {
                registro: registro.registro,
                tributo: campos.tributo,
                debitos,
                creditos,
                saldo_credor_anterior,
                valor_a_recolher,
                saldo_credor_a_transportar,
            })
        })
        .collect()
}

fn valor_do_campo(coletor: &mut FormatCollector, registro: &SpedRecord, pos: usize) -> Decimal {
    coletor.decimal(&format!("{}.{pos:02}", registro.registro), registro.campo(pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ABERTURA_FISCAL: &str = "\
|0000|017|0|01012024|31012024|EMPRESA TESTE LTDA|11222333000181||SP|123456789012|3550308|||A|1|
|0001|0|
|0150|F001|FORNECEDOR SA|1058|12345678000195||||3550308||Rua A|1||Centro|
|0150|F002|PRODUTOR RURAL|1058||52998224725||3550308||Sitio|1||Zona Rural|
|0200|P001|ARROZ TIPO 1|||KG|00|10063021|||10|||
|0200|P002|FEIJAO|||KG|00|07133319|||10|||
";

    fn c100(ind_emit: &str, cod_part: &str, num: &str, data: &str) -> String {
        format!(
            "|C100|0|{ind_emit}|{cod_part}|55|00|1|{num}|35240111222333000181550010000012341123456784|{data}|{data}|1000,00|0|0,00|0,00|1000,00|9|0,00|0,00|0,00|1000,00|180,00|0|0|0|0|0|0|0|0|\n"
        )
    }

    fn c170(num_item: &str, cod_item: &str, vl_item: &str) -> String {
        format!(
            "|C170|{num_item}|{cod_item}|DESCRICAO|10|KG|{vl_item}|0|0|000|1102|1102|{vl_item}|18,00|90,00|0|0|0|0|||0|0|0|50|{vl_item}|1,65|||8,25|50|{vl_item}|7,60|||38,00|\n"
        )
    }

    fn documento(linhas: &str) -> SpedDocument {
        parse_content(&format!("{ABERTURA_FISCAL}{linhas}|9999|20|\n"), SpedVariant::Fiscal)
    }

    #[test]
    fn divide_preservando_campos_vazios() {
        let campos = dividir_campos("|0150|F001|NOME||12345678000195|\r");
        assert_eq!(campos, ["0150", "F001", "NOME", "", "12345678000195"]);
        assert_eq!(dividir_campos("|"), [""]);
    }

    #[test]
    fn cabecalho_com_dois_itens() {
        let linhas = c100("1", "F001", "1234", "15012024")
            + &c170("1", "P001", "500,00")
            + &c170("2", "P002", "400,00");
        let doc = documento(&linhas);
        let mut c = FormatCollector::default();
        let itens = consolidar_itens(&doc, &mut c);

        assert_eq!(itens.len(), 2);
        for item in &itens {
            assert_eq!(item.numero_documento, "1234");
            assert_eq!(item.data_documento, NaiveDate::from_ymd_opt(2024, 1, 15));
            assert_eq!(item.cnpj_emitente, "12345678000195");
            assert_eq!(item.registro, "C170");
        }
        assert_eq!(itens[0].valor_item, dec!(500.00));
        assert_eq!(itens[1].valor_item, dec!(400.00));
        assert_eq!(itens[0].ncm.as_deref(), Some("10063021"));
        assert_eq!(itens[1].ncm.as_deref(), Some("07133319"));
        assert_eq!(itens[0].cfop.as_deref(), Some("1102"));
        assert_eq!(itens[0].cst.as_deref(), Some("000"));
        assert_eq!(itens[0].valor_icms, dec!(90.00));
        assert_eq!(itens[0].valor_cofins, dec!(38.00));
        assert_eq!(itens[0].cst_pis, "50");
        assert!(c.into_issues().is_empty());
    }

    #[test]
    fn item_antes_de_qualquer_cabecalho_e_descartado() {
        let linhas = c170("1", "P001", "10,00") + &c100("1", "F001", "77", "02012024") + &c170("1", "P002", "20,00");
        let doc = documento(&linhas);
        let itens = consolidar_itens(&doc, &mut FormatCollector::default());

        assert_eq!(itens.len(), 1);
        assert_eq!(itens[0].numero_documento, "77");
        assert_eq!(itens[0].valor_item, dec!(20.00));
    }

    #[test]
    fn novo_cabecalho_substitui_o_anterior() {
        let linhas = c100("1", "F001", "1", "02012024")
            + &c170("1", "P001", "1,00")
            + &c100("1", "F002", "2", "03012024")
            + &c170("1", "P001", "2,00")
            + &c170("2", "P001", "3,00");
        let itens = consolidar_itens(&documento(&linhas), &mut FormatCollector::default());

        let numeros: Vec<&str> = itens.iter().map(|i| i.numero_documento.as_str()).collect();
        assert_eq!(numeros, ["1", "2", "2"]);
        // Participante pessoa física: CPF do 0150
        assert_eq!(itens[1].cnpj_emitente, "52998224725");
    }

    #[test]
    fn emissao_propria_usa_cnpj_da_empresa() {
        let linhas = c100("0", "", "9", "05012024") + &c170("1", "P001", "1,00");
        let itens = consolidar_itens(&documento(&linhas), &mut FormatCollector::default());
        assert_eq!(itens[0].cnpj_emitente, "11222333000181");
    }

    #[test]
    fn participante_sem_cadastro_com_cnpj_no_codigo() {
        let linhas = c100("1", "44455566600024", "9", "05012024") + &c170("1", "P999", "1,00");
        let itens = consolidar_itens(&documento(&linhas), &mut FormatCollector::default());

        assert_eq!(itens[0].cnpj_emitente, "44455566600024");
        assert_eq!(itens[0].ncm, None);
    }

    #[test]
    fn registros_fora_da_lista_sao_ignorados() {
        let doc = parse_content("|C190|000|1102|18,00|\n|X|\n\n|C100|\n|D100|0|", SpedVariant::Fiscal);
        assert!(doc.registros.is_empty());
        assert!(!doc.leiaute_reconhecido);
    }

    #[test]
    fn dados_da_empresa_e_leiaute() {
        let doc = documento("");

        assert_eq!(doc.empresa.nome, "EMPRESA TESTE LTDA");
        assert_eq!(doc.empresa.cnpj, "11222333000181");
        assert_eq!(doc.empresa.uf, "SP");
        assert_eq!(doc.empresa.inscricao_estadual, "123456789012");
        assert_eq!(doc.empresa.periodo_inicio, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(doc.empresa.periodo_fim, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(doc.empresa.versao_leiaute, "017");
        assert!(doc.leiaute_reconhecido);
        assert_eq!(doc.participantes.len(), 2);
    }

    #[test]
    fn versao_desconhecida_usa_leiaute_mais_recente() {
        let texto = ABERTURA_FISCAL.replace("|0000|017|", "|0000|099|");
        let doc = parse_content(&texto, SpedVariant::Fiscal);

        assert!(!doc.leiaute_reconhecido);
        assert_eq!(doc.leiaute.variante, SpedVariant::Fiscal);
        assert_eq!(doc.leiaute.versoes.last(), Some(&"019"));
    }

    #[test]
    fn valor_ilegivel_vira_zero_registrado() {
        let linhas = c100("1", "F001", "5", "05012024") + &c170("1", "P001", "9x9");
        let doc = documento(&linhas);
        let mut c = FormatCollector::default();
        let itens = consolidar_itens(&doc, &mut c);
        let issues = c.into_issues();

        assert_eq!(itens[0].valor_item, Decimal::ZERO);
        assert!(issues.iter().any(|i| i.campo == "C170[5/1].VL_ITEM" && i.valor == "9x9"));
    }

    #[test]
    fn apuracao_icms() {
        let doc = documento("|E110|1000,00|0|0|0|400,00|0|0|0|50,00|550,00|0|550,00|0|0|\n");
        let apuracao = consolidar_apuracao(&doc, &mut FormatCollector::default());

        assert_eq!(apuracao.len(), 1);
        assert_eq!(apuracao[0].tributo, "ICMS");
        assert_eq!(apuracao[0].debitos, dec!(1000.00));
        assert_eq!(apuracao[0].creditos, dec!(400.00));
        assert_eq!(apuracao[0].saldo_credor_anterior, dec!(50.00));
        assert_eq!(apuracao[0].valor_a_recolher, dec!(550.00));
    }

    const CONTRIBUICOES: &str = "\
|0000|006|0|||01012024|31012024|EMPRESA TESTE LTDA|11222333000181|SP|3550308||00|0|
|0110|1|1|1||
|0150|F001|PRESTADORA|1058|12345678000195||||3550308||Rua|1||Centro|
|0200|S001|CONSULTORIA|||UN|09||||||
|A100|0|1|F001|00|1||55|NFSE55|10012024|10012024|2000,00|0|0,00|2000,00|33,00|2000,00|152,00|0|0|0|0|
|A170|1|S001|CONSULTORIA|2000,00|0|||50|2000,00|1,65|33,00|50|2000,00|7,60|152,00|
|M200|100,00|30,00|0|70,00|0|0|70,00|20,00|0|0|20,00|90,00|
|M600|460,00|138,00|0|322,00|0|0|322,00|92,00|0|0|92,00|414,00|
|9999|9|
";

    #[test]
    fn detecta_variante() {
        assert_eq!(SpedVariant::detectar(CONTRIBUICOES), SpedVariant::Contribuicoes);
        assert_eq!(SpedVariant::detectar(ABERTURA_FISCAL), SpedVariant::Fiscal);
    }

    #[test]
    fn contribuicoes_servicos_e_apuracao() {
        let doc = ler_sped(CONTRIBUICOES.as_bytes());

        assert_eq!(doc.variante, SpedVariant::Contribuicoes);
        assert!(doc.leiaute_reconhecido);
        assert_eq!(doc.empresa.cnpj, "11222333000181");
        assert_eq!(doc.empresa.periodo_inicio, NaiveDate::from_ymd_opt(2024, 1, 1));

        let mut c = FormatCollector::default();
        let itens = consolidar_itens(&doc, &mut c);
        assert_eq!(itens.len(), 1);
        assert_eq!(itens[0].numero_documento, "55");
        assert_eq!(itens[0].cnpj_emitente, "12345678000195");
        assert_eq!(itens[0].cfop, None);
        assert_eq!(itens[0].cst.as_deref(), Some("50"));
        assert_eq!(itens[0].ncm, None);
        assert_eq!(itens[0].quantidade, Decimal::ONE);
        assert_eq!(itens[0].valor_pis, dec!(33.00));
        assert_eq!(itens[0].valor_cofins, dec!(152.00));

        let apuracao = consolidar_apuracao(&doc, &mut c);
        assert_eq!(apuracao.len(), 2);
        assert_eq!(apuracao[0].tributo, "PIS");
        assert_eq!(apuracao[0].debitos, dec!(120.00));
        assert_eq!(apuracao[0].creditos, dec!(30.00));
        assert_eq!(apuracao[0].valor_a_recolher, dec!(90.00));
        assert_eq!(apuracao[1].tributo, "COFINS");
        assert_eq!(apuracao[1].valor_a_recolher, dec!(414.00));
        assert!(c.into_issues().is_empty());
    }

    #[test]
    fn latin1() {
        let bytes = b"|0000|017|0|01012024|31012024|CAF\xc9 S\xc3O JO\xc3O|11222333000181||SP|1|\n";
        let doc = ler_sped(bytes);
        assert_eq!(doc.empresa.nome, "CAFÉ SÃO JOÃO");
    }
}
