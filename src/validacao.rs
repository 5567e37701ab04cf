//! Validação semântica dos documentos normalizados.
//!
//! A lista de resultados segue uma ordem fixa: emitente (CNPJ/CPF),
//! inscrição estadual, CFOP de cada operação, CST de cada operação e NCM de
//! cada operação. As verificações contra as tabelas de referência vêm
//! depois, nunca intercaladas. Nenhuma verificação interrompe as demais.

use std::collections::BTreeSet;

use crate::{
    ConsolidatedItem, DocumentType, ParsedFiscalDocument, Severity, SpedDocument, TaxId,
    ValidationResult, credito_presumido, get_uf_por_codigo_ibge, reducao_base_icms,
    somente_digitos, uf_conhecida, validar_chave_acesso, validar_cnpj, validar_cpf,
};

/// Códigos de uma operação (item). `None` dispensa a verificação.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Operacao<'a> {
    pub cfop: Option<&'a str>,
    pub cst: Option<&'a str>,
    pub ncm: Option<&'a str>,
}

/// Visão de um documento com apenas o que a validação consome.
#[derive(Debug, Clone, Default)]
pub struct AlvoValidacao<'a> {
    pub emitente: Option<&'a TaxId>,
    pub inscricao_estadual: &'a str,
    pub uf_emitente: &'a str,
    pub chaves_acesso: Vec<&'a str>,
    pub operacoes: Vec<Operacao<'a>>,
}

impl<'a> From<&'a ParsedFiscalDocument> for AlvoValidacao<'a> {
    fn from(doc: &'a ParsedFiscalDocument) -> Self {
        let operacoes = doc
            .itens
            .iter()
            .filter_map(|item| match doc.tipo {
                DocumentType::NFe => Some(Operacao {
                    cfop: Some(item.cfop.as_str()),
                    cst: Some(item.cst.as_str()),
                    ncm: Some(item.ncm.as_str()),
                }),
                DocumentType::CTe => Some(Operacao {
                    cfop: Some(item.cfop.as_str()),
                    cst: Some(item.cst.as_str()),
                    ncm: None,
                }),
                // Serviços e manifestos não têm CFOP, CST nem NCM por item
                DocumentType::NFSe | DocumentType::MDFe => None,
            })
            .collect();

        // NFS-e usa código de verificação, não chave de 44 dígitos
        let chaves_acesso = match doc.tipo {
            DocumentType::NFSe => Vec::new(),
            _ => vec![doc.chave_acesso.as_str()],
        };

        AlvoValidacao {
            emitente: doc.emitente.documento.as_ref(),
            inscricao_estadual: &doc.emitente.inscricao_estadual,
            uf_emitente: &doc.emitente.uf,
            chaves_acesso,
            operacoes,
        }
    }
}

impl<'a> AlvoValidacao<'a> {
    /// Arquivo SPED: o emitente é o contribuinte do registro 0000 e as
    /// operações são os itens consolidados.
    pub fn de_sped(
        doc: &'a SpedDocument,
        cnpj_empresa: Option<&'a TaxId>,
        itens: &'a [ConsolidatedItem],
    ) -> Self {
        let chaves: BTreeSet<&str> = itens
            .iter()
            .map(|i| i.chave_acesso.as_str())
            .filter(|c| c.len() == 44)
            .collect();

        AlvoValidacao {
            emitente: cnpj_empresa,
            inscricao_estadual: &doc.empresa.inscricao_estadual,
            uf_emitente: &doc.empresa.uf,
            chaves_acesso: chaves.into_iter().collect(),
            operacoes: itens
                .iter()
                .map(|i| Operacao {
                    cfop: i.cfop.as_deref(),
                    cst: i.cst.as_deref(),
                    ncm: i.ncm.as_deref(),
                })
                .collect(),
        }
    }

    /// Somente verificação de NCM (tabelas de regras e de benefícios).
    pub fn de_ncms(ncms: impl IntoIterator<Item = &'a str>) -> Self {
        AlvoValidacao {
            operacoes: ncms
                .into_iter()
                .map(|ncm| Operacao {
                    ncm: Some(ncm),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

fn digitos_exatos(valor: &str, tamanhos: &[usize]) -> bool {
    valor.bytes().all(|b| b.is_ascii_digit()) && tamanhos.contains(&valor.len())
}

pub fn validar_cfop(cfop: &str) -> bool {
    digitos_exatos(cfop, &[4])
}

pub fn validar_cst(cst: &str) -> bool {
    digitos_exatos(cst, &[2, 3])
}

pub fn validar_ncm(ncm: &str) -> bool {
    digitos_exatos(ncm, &[8])
}

/// Inscrição estadual: apenas o tamanho (8 a 12 dígitos) é verificado.
pub fn validar_inscricao_estadual(ie: &str) -> bool {
    (8..=12).contains(&somente_digitos(ie).len())
}

/// Verificações semânticas, na ordem documentada no módulo.
pub fn validar_documento(alvo: &AlvoValidacao) -> Vec<ValidationResult> {
    let mut resultados = Vec::new();

    // 1. Emitente (ausente: nada é emitido)
    match alvo.emitente {
        Some(TaxId::Cnpj(cnpj)) => resultados.push(if validar_cnpj(cnpj) {
            ValidationResult::ok("emitente.cnpj", "CNPJ válido")
        } else {
            ValidationResult::falha(
                "emitente.cnpj",
                format!("CNPJ inválido: {cnpj}"),
                Severity::Error,
            )
        }),
        Some(TaxId::Cpf(cpf)) => resultados.push(if validar_cpf(cpf) {
            ValidationResult::ok("emitente.cpf", "CPF válido")
        } else {
            ValidationResult::falha(
                "emitente.cpf",
                format!("CPF inválido: {cpf}"),
                Severity::Error,
            )
        }),
        None => {}
    }

    // 2. Inscrição estadual
    let ie = alvo.inscricao_estadual.trim();
    if !ie.is_empty() {
        resultados.push(if validar_inscricao_estadual(ie) {
            ValidationResult::ok("emitente.inscricao_estadual", "Inscrição estadual com tamanho válido")
        } else {
            ValidationResult::falha(
                "emitente.inscricao_estadual",
                format!("Inscrição estadual deve ter de 8 a 12 dígitos: {ie}"),
                Severity::Warning,
            )
        });
    }

    // 3. CFOP, 4. CST e 5. NCM: um campo por vez, itens na ordem de origem
    let operacoes = &alvo.operacoes;
    verificar_codigos(&mut resultados, operacoes, "cfop", |op| op.cfop, validar_cfop, Severity::Error);
    verificar_codigos(&mut resultados, operacoes, "cst", |op| op.cst, validar_cst, Severity::Error);
    verificar_codigos(&mut resultados, operacoes, "ncm", |op| op.ncm, validar_ncm, Severity::Warning);

    resultados
}

fn verificar_codigos<'a>(
    resultados: &mut Vec<ValidationResult>,
    operacoes: &[Operacao<'a>],
    nome: &str,
    extrair: impl Fn(&Operacao<'a>) -> Option<&'a str>,
    validar: fn(&str) -> bool,
    severidade: Severity,
) {
    let sigla = nome.to_uppercase();

    for (i, operacao) in operacoes.iter().enumerate() {
        let Some(valor) = extrair(operacao) else {
            continue;
        };
        let campo = format!("item[{}].{nome}", i + 1);
        resultados.push(if validar(valor) {
            ValidationResult::ok(campo, format!("{sigla} válido"))
        } else {
            ValidationResult::falha(campo, format!("{sigla} em formato inválido: <{valor}>"), severidade)
        });
    }
}

/// Verificações contra as tabelas de referência, anexadas após as semânticas.
pub fn verificar_referencias(alvo: &AlvoValidacao) -> Vec<ValidationResult> {
    let mut resultados = Vec::new();
    let uf = alvo.uf_emitente.trim();

    for chave in alvo.chaves_acesso.iter().filter(|c| !c.is_empty()) {
        if !validar_chave_acesso(chave) {
            resultados.push(ValidationResult::falha(
                "chave_acesso",
                format!("Dígito verificador da chave não confere: {chave}"),
                Severity::Warning,
            ));
            continue;
        }

        resultados.push(ValidationResult::ok("chave_acesso", "Chave de acesso válida"));

        let divergente = chave
            .get(..2)
            .and_then(get_uf_por_codigo_ibge)
            .filter(|uf_da_chave| !uf.is_empty() && *uf_da_chave != uf);

        if let Some(uf_da_chave) = divergente {
            resultados.push(ValidationResult::falha(
                "chave_acesso.uf",
                format!("UF da chave ({uf_da_chave}) difere da UF do emitente ({uf})"),
                Severity::Warning,
            ));
        }
    }

    if !uf.is_empty() && !uf_conhecida(uf) {
        resultados.push(ValidationResult::falha(
            "emitente.uf",
            format!("UF sem alíquota de ICMS cadastrada: {uf}"),
            Severity::Warning,
        ));
    }

    let ncms: BTreeSet<&str> = alvo
        .operacoes
        .iter()
        .filter_map(|op| op.ncm)
        .filter(|ncm| validar_ncm(ncm))
        .collect();

    for ncm in ncms {
        if let Some(regra) = reducao_base_icms(ncm, uf) {
            resultados.push(ValidationResult::ok(
                format!("ncm.{ncm}"),
                format!(
                    "Elegível a redução de {}% da base do ICMS ({})",
                    regra.percentual, regra.descricao
                ),
            ));
        }
        if let Some(credito) = credito_presumido(ncm) {
            resultados.push(ValidationResult::ok(
                format!("ncm.{ncm}"),
                format!(
                    "Elegível a crédito presumido de PIS/COFINS de {}% ({})",
                    credito.percentual, credito.descricao
                ),
            ));
        }
    }

    resultados
}
