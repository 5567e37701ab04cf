use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

use crate::{FiscalError, FiscalResult, RE_MULTISPACE, decodificar_texto};

/// Nó de elemento de uma árvore XML em memória.
///
/// Os nomes guardam apenas o nome local (sem prefixo de namespace), pois os
/// leiautes fiscais variam entre `nfe:det` e `det` conforme o emissor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub nome: String,
    pub atributos: Vec<(String, String)>,
    pub texto: String,
    pub filhos: Vec<XmlElement>,
}

/// Nome do nó sintético que agrupa os elementos de nível superior.
const DOCUMENTO: &str = "#documento";

/// Profundidade máxima de elementos abertos.
///
/// As buscas e o descarte da árvore são recursivos; acima deste limite o
/// documento é recusado em vez de esgotar a pilha da thread.
pub const PROFUNDIDADE_MAXIMA_XML: usize = 256;

impl XmlElement {
    fn from_start(e: &BytesStart) -> Self {
        let nome = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        let atributos = e
            .attributes()
            .flatten()
            .map(|attr| {
                let chave = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let valor = attr.unescape_value().unwrap_or_default().into_owned();
                (chave, valor)
            })
            .collect();

        XmlElement {
            nome,
            atributos,
            ..Default::default()
        }
    }

    /// Lê o documento inteiro e devolve um nó sintético cujos filhos são os
    /// elementos de nível superior. Documento vazio gera nó sem filhos.
    ///
    /// Aninhamento acima de [`PROFUNDIDADE_MAXIMA_XML`] é erro.
    pub fn parse(xml: &str) -> FiscalResult<XmlElement> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        // Pilha de elementos abertos; a base é o nó do documento
        let mut pilha = vec![XmlElement {
            nome: DOCUMENTO.to_string(),
            ..Default::default()
        }];

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    // A base da pilha é o nó sintético do documento
                    if pilha.len() > PROFUNDIDADE_MAXIMA_XML {
                        return Err(FiscalError::XmlProfundidade {
                            limite: PROFUNDIDADE_MAXIMA_XML,
                        });
                    }
                    pilha.push(XmlElement::from_start(e));
                }
                Event::Empty(ref e) => {
                    let vazio = XmlElement::from_start(e);
                    if let Some(pai) = pilha.last_mut() {
                        pai.filhos.push(vazio);
                    }
                }
                Event::Text(ref e) => {
                    let texto = e.unescape()?;
                    if pilha.len() > 1 {
                        if let Some(atual) = pilha.last_mut() {
                            atual.texto.push_str(&texto);
                        }
                    }
                }
                Event::CData(e) => {
                    if let Some(atual) = pilha.last_mut() {
                        atual.texto.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::End(_) => fechar_topo(&mut pilha),
                Event::Eof => break,
                _ => {}
            }
        }

        // Elementos não fechados no fim do arquivo são anexados assim mesmo
        while pilha.len() > 1 {
            fechar_topo(&mut pilha);
        }

        Ok(pilha.pop().unwrap_or_default())
    }

    /// Igual a [`XmlElement::parse`], aceitando bytes em UTF-8 ou Latin-1.
    pub fn from_bytes(bytes: &[u8]) -> FiscalResult<XmlElement> {
        XmlElement::parse(&decodificar_texto(bytes))
    }

    /// Filho direto com o nome indicado.
    pub fn child(&self, nome: &str) -> Option<&XmlElement> {
        self.filhos.iter().find(|f| f.nome == nome)
    }

    /// O próprio nó ou o primeiro descendente (pré-ordem) com o nome indicado.
    pub fn find(&self, nome: &str) -> Option<&XmlElement> {
        if self.nome == nome {
            return Some(self);
        }
        self.filhos.iter().find_map(|f| f.find(nome))
    }

    /// Primeiro descendente com um dos nomes, na ordem de preferência dada.
    pub fn find_any(&self, nomes: &[&str]) -> Option<&XmlElement> {
        nomes.iter().find_map(|nome| self.find(nome))
    }

    /// Todos os descendentes com o nome indicado, em ordem de documento.
    pub fn find_all<'a>(&'a self, nome: &str) -> Vec<&'a XmlElement> {
        let mut encontrados = Vec::new();
        self.coletar(nome, &mut encontrados);
        encontrados
    }

    fn coletar<'a>(&'a self, nome: &str, acc: &mut Vec<&'a XmlElement>) {
        for filho in &self.filhos {
            if filho.nome == nome {
                acc.push(filho);
            }
            filho.coletar(nome, acc);
        }
    }

    /// Caminho de descendentes: cada etapa é procurada dentro da anterior.
    pub fn find_path(&self, caminho: &[&str]) -> Option<&XmlElement> {
        caminho
            .iter()
            .try_fold(self, |atual, nome| atual.find(nome))
    }

    /// Texto do nó, com espaços internos repetidos reduzidos a um.
    pub fn text(&self) -> String {
        RE_MULTISPACE.replace_all(self.texto.trim(), " ").into_owned()
    }

    /// Texto do primeiro descendente com o nome; vazio quando ausente.
    pub fn text_of(&self, nome: &str) -> String {
        self.find(nome).map(XmlElement::text).unwrap_or_default()
    }

    /// Texto do primeiro filho direto com o nome; vazio quando ausente.
    pub fn child_text(&self, nome: &str) -> String {
        self.child(nome).map(XmlElement::text).unwrap_or_default()
    }

    pub fn attr(&self, nome: &str) -> Option<&str> {
        self.atributos
            .iter()
            .find(|(chave, _)| chave == nome)
            .map(|(_, valor)| valor.as_str())
    }

    /// Primeiro filho elemento (usado para grupos de escolha como `ICMS00`/`ICMS20`).
    pub fn first_child(&self) -> Option<&XmlElement> {
        self.filhos.first()
    }
}

fn fechar_topo(pilha: &mut Vec<XmlElement>) {
    if pilha.len() < 2 {
        return;
    }
    if let Some(fechado) = pilha.pop() {
        if let Some(pai) = pilha.last_mut() {
            pai.filhos.push(fechado);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <nfe:nfeProc xmlns:nfe="http://www.portalfiscal.inf.br/nfe" versao="4.00">
            <nfe:NFe>
                <nfe:infNFe Id="NFe123" versao="4.00">
                    <nfe:det nItem="1"><nfe:prod><nfe:xProd>Caf&#233;   torrado</nfe:xProd></nfe:prod></nfe:det>
                    <nfe:det nItem="2"><nfe:prod><nfe:xProd><![CDATA[A & B]]></nfe:xProd></nfe:prod></nfe:det>
                    <nfe:vazio/>
                </nfe:infNFe>
            </nfe:NFe>
        </nfe:nfeProc>"#;

    #[test]
    fn arvore_com_nomes_locais() {
        let doc = XmlElement::parse(XML).unwrap();
        let inf = doc.find("infNFe").unwrap();

        assert_eq!(inf.attr("Id"), Some("NFe123"));
        assert_eq!(inf.find_all("det").len(), 2);
        assert!(inf.child("vazio").is_some());
        assert_eq!(doc.find_path(&["NFe", "infNFe", "det"]).unwrap().attr("nItem"), Some("1"));
    }

    #[test]
    fn texto_normalizado_e_cdata() {
        let doc = XmlElement::parse(XML).unwrap();
        let dets = doc.find_all("det");

        assert_eq!(dets[0].text_of("xProd"), "Café torrado");
        assert_eq!(dets[1].text_of("xProd"), "A & B");
        assert_eq!(dets[1].text_of("inexistente"), "");
    }

    #[test]
    fn documento_vazio_nao_tem_filhos() {
        let doc = XmlElement::parse("").unwrap();
        assert!(doc.filhos.is_empty());
        assert!(doc.find("infNFe").is_none());
    }

    #[test]
    fn fechamento_divergente_e_erro() {
        assert!(XmlElement::parse("<a><b></a></b>").is_err());
    }

    #[test]
    fn aninhamento_excessivo_e_erro() {
        let profundo = format!("{}{}", "<a>".repeat(100_000), "</a>".repeat(100_000));
        assert!(matches!(
            XmlElement::parse(&profundo),
            Err(FiscalError::XmlProfundidade { limite: PROFUNDIDADE_MAXIMA_XML })
        ));

        let no_limite = format!(
            "{}{}",
            "<a>".repeat(PROFUNDIDADE_MAXIMA_XML),
            "</a>".repeat(PROFUNDIDADE_MAXIMA_XML)
        );
        assert!(XmlElement::parse(&no_limite).is_ok());
    }

    #[test]
    fn latin1() {
        let doc = XmlElement::from_bytes(b"<a><b>S\xe3o Paulo</b></a>").unwrap();
        assert_eq!(doc.text_of("b"), "São Paulo");
    }
}
