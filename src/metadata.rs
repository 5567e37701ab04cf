use crate::AuthorizationStatus;

// --- Tabelas de Referência ---

/// Modelos de Documentos Fiscais - Tabela 4.1.1
/// Otimizado para não usar memória RAM (armazenado no binário)
pub fn get_modelo_documentos_fiscais(codigo: &str) -> &'static str {
    match codigo {
        "01" => "Nota Fiscal",
        "1B" => "Nota Fiscal Avulsa",
        "02" => "Nota Fiscal de Venda a Consumidor",
        "2D" => "Cupom Fiscal emitido por ECF",
        "2E" => "Bilhete de Passagem emitido por ECF",
        "04" => "Nota Fiscal de Produtor",
        "06" => "Nota Fiscal / Conta de Energia Elétrica",
        "07" => "Nota Fiscal de Serviço de Transporte",
        "08" => "Conhecimento de Transporte Rodoviário de Cargas",
        "8B" => "Conhecimento de Transporte de Cargas Avulso",
        "09" => "Conhecimento de Transporte Aquaviário de Cargas",
        "10" => "Conhecimento Aéreo",
        "11" => "Conhecimento de Transporte Ferroviário de Cargas",
        "13" => "Bilhete de Passagem Rodoviário",
        "14" => "Bilhete de Passagem Aquaviário",
        "15" => "Bilhete de Passagem e Nota de Bagagem",
        "16" => "Bilhete de Passagem Ferroviário",
        "17" => "Despacho de Transporte",
        "18" => "Resumo de Movimento Diário",
        "20" => "Ordem de Coleta de Cargas",
        "21" => "Nota Fiscal de Serviço de Comunicação",
        "22" => "Nota Fiscal de Serviço de Telecomunicação",
        "23" => "GNRE",
        "24" => "Autorização de Carregamento e Transporte",
        "25" => "Manifesto de Carga",
        "26" => "Conhecimento de Transporte Multimodal de Cargas",
        "27" => "Nota Fiscal de Transporte Ferroviário de Cargas",
        "28" => "Nota Fiscal / Conta de Fornecimento de Gás Canalizado",
        "29" => "Nota Fiscal / Conta de Fornecimento de Água Canalizada",
        "30" => "Bilhete / Recibo do Passageiro",
        "55" => "Nota Fiscal Eletrônica: NF-e",
        "57" => "Conhecimento de Transporte Eletrônico: CT-e",
        "58" => "Manifesto Eletrônico de Documentos Fiscais: MDF-e",
        "59" => "Cupom Fiscal Eletrônico: CF-e (CF-e-SAT)",
        "60" => "Cupom Fiscal Eletrônico: CF-e-ECF",
        "63" => "Bilhete de Passagem Eletrônico: BP-e",
        "65" => "Nota Fiscal Eletrônica ao Consumidor Final: NFC-e",
        "66" => "Nota Fiscal de Energia Elétrica Eletrônica: NF3e",
        "67" => "Conhecimento de Transporte Eletrônico para Outros Serviços: CT-e OS",
        _ => "Modelo Desconhecido",
    }
}

/// Situação de autorização a partir do código de status (cStat) do protocolo.
///
/// Retorna `None` para códigos fora da tabela; o chamador decide o padrão.
pub fn get_situacao_protocolo(c_stat: &str) -> Option<AuthorizationStatus> {
    match c_stat.trim() {
        // Autorizado o uso / autorizado fora de prazo
        "100" | "150" => Some(AuthorizationStatus::Authorized),
        // Cancelamento homologado (inclusive fora de prazo) / evento de cancelamento
        "101" | "135" | "151" | "155" => Some(AuthorizationStatus::Cancelled),
        // Uso denegado e irregularidades de emitente/destinatário
        "110" | "205" | "301" | "302" | "303" => Some(AuthorizationStatus::Denied),
        _ => None,
    }
}

/// Unidades federativas pelo código IBGE (dois primeiros dígitos da chave de acesso).
pub fn get_uf_por_codigo_ibge(codigo: &str) -> Option<&'static str> {
    let uf = match codigo {
        "11" => "RO",
        "12" => "AC",
        "13" => "AM",
        "14" => "RR",
        "15" => "PA",
        "16" => "AP",
        "17" => "TO",
        "21" => "MA",
        "22" => "PI",
        "23" => "CE",
        "24" => "RN",
        "25" => "PB",
        "26" => "PE",
        "27" => "AL",
        "28" => "SE",
        "29" => "BA",
        "31" => "MG",
        "32" => "ES",
        "33" => "RJ",
        "35" => "SP",
        "41" => "PR",
        "42" => "SC",
        "43" => "RS",
        "50" => "MS",
        "51" => "MT",
        "52" => "GO",
        "53" => "DF",
        _ => return None,
    };
    Some(uf)
}
