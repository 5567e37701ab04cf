//! Parser dos XML fiscais (NF-e, CT-e, NFS-e e MDF-e) para o modelo normalizado.
//!
//! O tipo é declarado pelo chamador. A ausência do elemento raiz do tipo é
//! erro estrutural; a ausência de qualquer outro grupo apenas deixa os campos
//! correspondentes vazios ou zerados.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::{
    AuthorizationStatus, DocumentType, FiscalError, FiscalResult, FormatCollector, LineItem,
    ParsedFiscalDocument, Party, TaxAmount, TaxId, XmlElement, get_situacao_protocolo,
};

/// Converte o XML para o documento normalizado do tipo declarado.
pub fn parse_xml_fiscal(bytes: &[u8], tipo: DocumentType) -> FiscalResult<ParsedFiscalDocument> {
    let doc = XmlElement::from_bytes(bytes)?;
    parse_documento(&doc, tipo)
}

/// Como [`parse_xml_fiscal`], com o tipo informado em texto (`"nfe"`, `"cte"`, ...).
///
/// Um tipo fora do conjunto aceito falha antes de qualquer leitura do XML.
pub fn parse_xml_fiscal_declarado(
    bytes: &[u8],
    tipo: &str,
) -> FiscalResult<ParsedFiscalDocument> {
    let tipo: DocumentType = tipo.parse()?;
    parse_xml_fiscal(bytes, tipo)
}

pub fn parse_documento(doc: &XmlElement, tipo: DocumentType) -> FiscalResult<ParsedFiscalDocument> {
    let mut coletor = FormatCollector::default();

    let mut documento = match tipo {
        DocumentType::NFe => parse_nfe(doc, &mut coletor)?,
        DocumentType::CTe => parse_cte(doc, &mut coletor)?,
        DocumentType::NFSe => parse_nfse(doc, &mut coletor)?,
        DocumentType::MDFe => parse_mdfe(doc, &mut coletor)?,
    };

    documento.format_issues = coletor.into_issues();

    debug!(
        tipo = %tipo,
        numero = %documento.numero,
        itens = documento.itens.len(),
        campos_padronizados = documento.format_issues.len(),
        "documento XML interpretado"
    );

    Ok(documento)
}

// --- Auxiliares comuns ---

fn texto(no: Option<&XmlElement>, tag: &str) -> String {
    no.map(|n| n.text_of(tag)).unwrap_or_default()
}

fn texto_any(no: Option<&XmlElement>, tags: &[&str]) -> String {
    no.and_then(|n| n.find_any(tags))
        .map(XmlElement::text)
        .unwrap_or_default()
}

fn localizar_raiz<'a>(
    doc: &'a XmlElement,
    tipo: DocumentType,
    nomes: &[&'static str],
) -> FiscalResult<&'a XmlElement> {
    doc.find_any(nomes).ok_or(FiscalError::MissingStructure {
        tipo,
        elemento: nomes[0],
    })
}

/// CNPJ tem precedência; sem CNPJ, usa o CPF; sem ambos, `None`.
fn extrair_documento(no: &XmlElement) -> Option<TaxId> {
    let cnpj = no.find_any(&["CNPJ", "Cnpj"]).map(XmlElement::text);
    let cpf = no.find_any(&["CPF", "Cpf"]).map(XmlElement::text);

    match (cnpj, cpf) {
        (Some(cnpj), _) if !cnpj.is_empty() => Some(TaxId::Cnpj(cnpj)),
        (_, Some(cpf)) if !cpf.is_empty() => Some(TaxId::Cpf(cpf)),
        _ => None,
    }
}

fn extrair_party(no: Option<&XmlElement>) -> Party {
    let Some(no) = no else {
        return Party::default();
    };

    Party {
        documento: extrair_documento(no),
        nome: texto_any(Some(no), &["xNome", "RazaoSocial", "NomeFantasia"]),
        inscricao_estadual: texto_any(Some(no), &["IE", "InscricaoEstadual"]),
        uf: texto_any(Some(no), &["UF", "Uf"]),
    }
}

fn extrair_tributo(
    grupo: &XmlElement,
    tags: [&str; 3],
    prefixo: &str,
    c: &mut FormatCollector,
) -> TaxAmount {
    let [base, aliquota, valor] = tags;
    TaxAmount {
        base_calculo: c.decimal(&format!("{prefixo}.{base}"), &grupo.text_of(base)),
        aliquota: c.decimal(&format!("{prefixo}.{aliquota}"), &grupo.text_of(aliquota)),
        valor: c.decimal(&format!("{prefixo}.{valor}"), &grupo.text_of(valor)),
    }
}

/// Situação a partir do protocolo (`protNFe`, `protCTe`, `protMDFe`).
///
/// Código ausente da tabela é tratado como autorizado. Esse padrão não é
/// conservador e fica registrado como campo padronizado para revisão.
fn determinar_status(
    doc: &XmlElement,
    protocolo: &str,
    c: &mut FormatCollector,
) -> AuthorizationStatus {
    let Some(prot) = doc.find(protocolo) else {
        c.registrar(protocolo, "", "protocolo ausente; situação assumida como autorizada");
        return AuthorizationStatus::Authorized;
    };

    situacao_do_codigo(&prot.text_of("cStat"), &format!("{protocolo}.cStat"), c)
}

fn situacao_do_codigo(c_stat: &str, campo: &str, c: &mut FormatCollector) -> AuthorizationStatus {
    get_situacao_protocolo(c_stat).unwrap_or_else(|| {
        warn!(c_stat, campo, "código de status desconhecido; assumido autorizado");
        c.registrar(
            campo,
            c_stat,
            "código de status desconhecido; situação assumida como autorizada",
        );
        AuthorizationStatus::Authorized
    })
}

/// A chave vem do protocolo; sem ele, do atributo `Id` da raiz.
///
/// Chaves de documentos referenciados (`docAnt`, `infCteComp`, `refNFe`)
/// ficam fora do protocolo e não são consideradas.
fn chave_de_acesso(
    doc: &XmlElement,
    raiz: &XmlElement,
    [protocolo, tag_chave]: [&str; 2],
    prefixo_id: &str,
) -> String {
    let do_protocolo = doc
        .find_path(&[protocolo, tag_chave])
        .map(XmlElement::text)
        .unwrap_or_default();
    if !do_protocolo.is_empty() {
        return do_protocolo;
    }
    raiz.attr("Id")
        .map(|id| id.trim_start_matches(prefixo_id).to_string())
        .unwrap_or_default()
}

fn nao_vazio(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

// --- NF-e ---

fn parse_nfe(doc: &XmlElement, c: &mut FormatCollector) -> FiscalResult<ParsedFiscalDocument> {
    let raiz = localizar_raiz(doc, DocumentType::NFe, &["infNFe"])?;
    let mut d = ParsedFiscalDocument::new(DocumentType::NFe);

    let ide = raiz.child("ide");
    d.numero = texto(ide, "nNF");
    d.serie = texto(ide, "serie");
    d.data_emissao = c.data_hora("ide.dhEmi", &texto_any(ide, &["dhEmi", "dEmi"]));

    d.emitente = extrair_party(raiz.child("emit"));
    d.destinatario = extrair_party(raiz.child("dest"));

    d.itens = raiz
        .find_all("det")
        .into_iter()
        .enumerate()
        .filter_map(|(i, det)| item_nfe(det, i, c))
        .collect();

    // Totais: sempre do grupo ICMSTot do cabeçalho
    let tot = raiz.find("ICMSTot");
    d.valor_total = c.decimal("ICMSTot.vNF", &texto(tot, "vNF"));
    d.totais.valor_produtos = c.decimal("ICMSTot.vProd", &texto(tot, "vProd"));
    d.totais.base_icms = c.decimal("ICMSTot.vBC", &texto(tot, "vBC"));
    d.totais.valor_icms = c.decimal("ICMSTot.vICMS", &texto(tot, "vICMS"));
    d.totais.valor_ipi = c.decimal("ICMSTot.vIPI", &texto(tot, "vIPI"));
    d.totais.valor_pis = c.decimal("ICMSTot.vPIS", &texto(tot, "vPIS"));
    d.totais.valor_cofins = c.decimal("ICMSTot.vCOFINS", &texto(tot, "vCOFINS"));
    d.totais.valor_frete = c.decimal("ICMSTot.vFrete", &texto(tot, "vFrete"));
    d.totais.valor_desconto = c.decimal("ICMSTot.vDesc", &texto(tot, "vDesc"));
    d.totais.valor_iss = c.decimal("ISSQNtot.vISS", &texto(raiz.find("ISSQNtot"), "vISS"));

    d.chave_acesso = chave_de_acesso(doc, raiz, ["protNFe", "chNFe"], "NFe");
    d.status = determinar_status(doc, "protNFe", c);
    d.observacoes = nao_vazio(texto(raiz.child("infAdic"), "infCpl"));

    Ok(d)
}

/// Item sem `prod` e sem `imposto` é descartado.
fn item_nfe(det: &XmlElement, indice: usize, c: &mut FormatCollector) -> Option<LineItem> {
    let prod = det.child("prod");
    let imposto = det.child("imposto");

    if prod.is_none() && imposto.is_none() {
        debug!(indice, "item <det> sem prod e sem imposto descartado");
        return None;
    }

    let numero = det
        .attr("nItem")
        .and_then(|n| n.parse().ok())
        .unwrap_or(indice as u32 + 1);
    let campo = |tag: &str| format!("det[{numero}].{tag}");

    let mut item = LineItem {
        numero,
        codigo: texto(prod, "cProd"),
        descricao: texto(prod, "xProd"),
        ncm: texto(prod, "NCM"),
        cfop: texto(prod, "CFOP"),
        quantidade: c.decimal(&campo("qCom"), &texto(prod, "qCom")),
        valor_unitario: c.decimal(&campo("vUnCom"), &texto(prod, "vUnCom")),
        valor_total: c.decimal(&campo("vProd"), &texto(prod, "vProd")),
        ..Default::default()
    };

    let Some(imposto) = imposto else {
        return Some(item);
    };

    // ICMS: grupo de escolha (ICMS00, ICMS20, ..., ICMSSN102, ...)
    if let Some(grupo) = imposto.child("ICMS").and_then(XmlElement::first_child) {
        item.cst = nao_vazio(grupo.child_text("CST")).unwrap_or_else(|| grupo.child_text("CSOSN"));
        item.icms = Some(extrair_tributo(grupo, ["vBC", "pICMS", "vICMS"], &campo("ICMS"), c));
    }

    if let Some(ipi) = imposto.child("IPI") {
        item.ipi = Some(match ipi.child("IPITrib") {
            Some(trib) => extrair_tributo(trib, ["vBC", "pIPI", "vIPI"], &campo("IPI"), c),
            None => TaxAmount::default(),
        });
    }

    if let Some(grupo) = imposto.child("PIS").and_then(XmlElement::first_child) {
        item.pis = Some(extrair_tributo(grupo, ["vBC", "pPIS", "vPIS"], &campo("PIS"), c));
    }

    if let Some(grupo) = imposto.child("COFINS").and_then(XmlElement::first_child) {
        item.cofins = Some(extrair_tributo(grupo, ["vBC", "pCOFINS", "vCOFINS"], &campo("COFINS"), c));
    }

    Some(item)
}

// --- CT-e ---

fn parse_cte(doc: &XmlElement, c: &mut FormatCollector) -> FiscalResult<ParsedFiscalDocument> {
    let raiz = localizar_raiz(doc, DocumentType::CTe, &["infCte"])?;
    let mut d = ParsedFiscalDocument::new(DocumentType::CTe);

    let ide = raiz.child("ide");
    d.numero = texto(ide, "nCT");
    d.serie = texto(ide, "serie");
    d.data_emissao = c.data_hora("ide.dhEmi", &texto(ide, "dhEmi"));

    d.emitente = extrair_party(raiz.child("emit"));
    d.destinatario = extrair_party(raiz.child("dest"));

    let v_prest = raiz.child("vPrest");
    let icms = raiz
        .child("imp")
        .and_then(|imp| imp.child("ICMS"))
        .and_then(XmlElement::first_child);

    d.valor_total = c.decimal("vPrest.vTPrest", &texto(v_prest, "vTPrest"));
    d.totais.valor_produtos = c.decimal("infCarga.vCarga", &texto(raiz.find("infCarga"), "vCarga"));

    // A prestação do serviço de transporte é o único item do CT-e
    if v_prest.is_some() || icms.is_some() {
        let mut item = LineItem {
            numero: 1,
            descricao: texto(ide, "natOp"),
            cfop: texto(ide, "CFOP"),
            quantidade: Decimal::ONE,
            valor_unitario: d.valor_total,
            valor_total: d.valor_total,
            ..Default::default()
        };

        if let Some(grupo) = icms {
            let tributo = extrair_tributo(grupo, ["vBC", "pICMS", "vICMS"], "imp.ICMS", c);
            item.cst = nao_vazio(grupo.child_text("CST")).unwrap_or_else(|| grupo.child_text("CSOSN"));
            item.icms = Some(tributo);
            d.totais.base_icms = tributo.base_calculo;
            d.totais.valor_icms = tributo.valor;
        }

        d.itens.push(item);
    }

    d.chave_acesso = chave_de_acesso(doc, raiz, ["protCTe", "chCTe"], "CTe");
    d.status = determinar_status(doc, "protCTe", c);
    d.observacoes = nao_vazio(texto(raiz.child("compl"), "xObs"));

    Ok(d)
}

// --- NFS-e (ABRASF v1/v2 e leiaute nacional) ---

fn parse_nfse(doc: &XmlElement, c: &mut FormatCollector) -> FiscalResult<ParsedFiscalDocument> {
    let raiz = localizar_raiz(doc, DocumentType::NFSe, &["InfNfse", "infNFSe"])?;
    let mut d = ParsedFiscalDocument::new(DocumentType::NFSe);

    d.numero = nao_vazio(raiz.child_text("Numero")).unwrap_or_else(|| raiz.text_of("nNFSe"));
    d.serie = texto(raiz.find("IdentificacaoRps"), "Serie");
    d.data_emissao = c.data_hora(
        "DataEmissao",
        &texto_any(Some(raiz), &["DataEmissao", "dhEmi", "dhProc"]),
    );

    d.emitente = extrair_party(raiz.find_any(&["Prestador", "PrestadorServico", "prest", "emit"]));
    d.destinatario = extrair_party(raiz.find_any(&["Tomador", "TomadorServico", "toma"]));

    let valores_documento = raiz.find_any(&["Valores", "valores"]);

    d.itens = raiz
        .find_all("Servico")
        .into_iter()
        .chain(raiz.find_all("serv"))
        .enumerate()
        .filter_map(|(i, servico)| item_nfse(servico, valores_documento, i, c))
        .collect();

    d.valor_total = c.decimal(
        "Valores.ValorServicos",
        &texto_any(Some(raiz), &["ValorServicos", "vServ"]),
    );
    d.totais.valor_produtos = d.valor_total;
    d.totais.valor_iss = c.decimal("Valores.ValorIss", &texto_any(Some(raiz), &["ValorIss", "vISSQN"]));
    d.totais.valor_pis = c.decimal("Valores.ValorPis", &texto_any(valores_documento, &["ValorPis", "vPis"]));
    d.totais.valor_cofins = c.decimal(
        "Valores.ValorCofins",
        &texto_any(valores_documento, &["ValorCofins", "vCofins"]),
    );

    d.chave_acesso = nao_vazio(raiz.child_text("CodigoVerificacao"))
        .or_else(|| raiz.attr("Id").map(|id| id.trim_start_matches("NFS").to_string()))
        .unwrap_or_default();

    // NFS-e não tem protocolo de autorização: vale o registro de cancelamento
    d.status = if doc.find_any(&["NfseCancelamento", "CancelamentoNfse"]).is_some() {
        AuthorizationStatus::Cancelled
    } else {
        match raiz.find("cStat") {
            Some(stat) => situacao_do_codigo(&stat.text(), "cStat", c),
            None => AuthorizationStatus::Authorized,
        }
    };

    d.observacoes = nao_vazio(texto_any(Some(raiz), &["OutrasInformacoes", "xInfComp"]));

    Ok(d)
}

fn item_nfse(
    servico: &XmlElement,
    valores_documento: Option<&XmlElement>,
    indice: usize,
    c: &mut FormatCollector,
) -> Option<LineItem> {
    let produto = servico.find_any(&["ItemListaServico", "Discriminacao", "cServ", "xDescServ"]);
    let valores = servico.find_any(&["Valores", "valores"]).or(valores_documento);

    if produto.is_none() && valores.is_none() {
        debug!(indice, "serviço sem discriminação e sem valores descartado");
        return None;
    }

    let numero = indice as u32 + 1;
    let campo = |tag: &str| format!("servico[{numero}].{tag}");
    let valor = c.decimal(&campo("ValorServicos"), &texto_any(valores, &["ValorServicos", "vServ"]));

    let mut item = LineItem {
        numero,
        codigo: texto_any(Some(servico), &["ItemListaServico", "cTribNac"]),
        descricao: texto_any(Some(servico), &["Discriminacao", "xDescServ"]),
        quantidade: Decimal::ONE,
        valor_unitario: valor,
        valor_total: valor,
        ..Default::default()
    };

    if let Some(valores) = valores {
        item.iss = Some(TaxAmount {
            base_calculo: c.decimal(&campo("BaseCalculo"), &texto_any(Some(valores), &["BaseCalculo", "vBC"])),
            aliquota: c.decimal(&campo("Aliquota"), &texto_any(Some(valores), &["Aliquota", "pAliq"])),
            valor: c.decimal(&campo("ValorIss"), &texto_any(Some(valores), &["ValorIss", "vISSQN"])),
        });

        let pis = texto_any(Some(valores), &["ValorPis", "vPis"]);
        if !pis.is_empty() {
            item.pis = Some(TaxAmount {
                valor: c.decimal(&campo("ValorPis"), &pis),
                ..Default::default()
            });
        }

        let cofins = texto_any(Some(valores), &["ValorCofins", "vCofins"]);
        if !cofins.is_empty() {
            item.cofins = Some(TaxAmount {
                valor: c.decimal(&campo("ValorCofins"), &cofins),
                ..Default::default()
            });
        }
    }

    Some(item)
}

// --- MDF-e ---

fn parse_mdfe(doc: &XmlElement, c: &mut FormatCollector) -> FiscalResult<ParsedFiscalDocument> {
    let raiz = localizar_raiz(doc, DocumentType::MDFe, &["infMDFe"])?;
    let mut d = ParsedFiscalDocument::new(DocumentType::MDFe);

    let ide = raiz.child("ide");
    d.numero = texto(ide, "nMDF");
    d.serie = texto(ide, "serie");
    d.data_emissao = c.data_hora("ide.dhEmi", &texto(ide, "dhEmi"));
    d.emitente = extrair_party(raiz.child("emit"));

    // Documentos vinculados por município de descarregamento
    let mut numero = 0;
    for descarga in raiz.find_all("infMunDescarga") {
        let municipio = descarga.child_text("xMunDescarga");

        for (tag, tag_chave, sigla) in [("infNFe", "chNFe", "NF-e"), ("infCTe", "chCTe", "CT-e")] {
            for vinculado in descarga.find_all(tag) {
                numero += 1;
                d.itens.push(LineItem {
                    numero,
                    codigo: vinculado.text_of(tag_chave),
                    descricao: format!("{sigla} vinculada ({municipio})"),
                    quantidade: Decimal::ONE,
                    ..Default::default()
                });
            }
        }
    }

    let tot = raiz.child("tot");
    d.valor_total = c.decimal("tot.vCarga", &texto(tot, "vCarga"));
    d.totais.valor_produtos = d.valor_total;

    d.chave_acesso = chave_de_acesso(doc, raiz, ["protMDFe", "chMDFe"], "MDFe");
    d.status = determinar_status(doc, "protMDFe", c);
    d.observacoes = nao_vazio(texto(raiz.child("infAdic"), "infCpl"));

    Ok(d)
}
