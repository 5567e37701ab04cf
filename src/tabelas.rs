//! Tabelas tributárias de referência: alíquotas de ICMS, reduções de base de
//! cálculo por NCM, alíquotas de PIS/COFINS por regime e crédito presumido
//! da agroindústria.
//!
//! Montadas uma única vez e somente lidas depois disso; podem ser
//! consultadas de várias threads sem sincronização.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::{collections::HashMap, sync::LazyLock};

/// Alíquota interna (modal) do ICMS por UF, em percentual.
pub static ALIQUOTA_ICMS_INTERNA: LazyLock<HashMap<&'static str, Decimal>> = LazyLock::new(|| {
    HashMap::from([
        ("AC", dec!(19)),
        ("AL", dec!(19)),
        ("AM", dec!(20)),
        ("AP", dec!(18)),
        ("BA", dec!(20.5)),
        ("CE", dec!(20)),
        ("DF", dec!(20)),
        ("ES", dec!(17)),
        ("GO", dec!(19)),
        ("MA", dec!(22)),
        ("MG", dec!(18)),
        ("MS", dec!(17)),
        ("MT", dec!(17)),
        ("PA", dec!(19)),
        ("PB", dec!(20)),
        ("PE", dec!(20.5)),
        ("PI", dec!(21)),
        ("PR", dec!(19.5)),
        ("RJ", dec!(22)),
        ("RN", dec!(18)),
        ("RO", dec!(19.5)),
        ("RR", dec!(20)),
        ("RS", dec!(17)),
        ("SC", dec!(17)),
        ("SE", dec!(19)),
        ("SP", dec!(18)),
        ("TO", dec!(20)),
    ])
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regiao {
    Norte,
    Nordeste,
    CentroOeste,
    Sudeste,
    Sul,
}

pub fn regiao_da_uf(uf: &str) -> Option<Regiao> {
    let regiao = match uf {
        "AC" | "AM" | "AP" | "PA" | "RO" | "RR" | "TO" => Regiao::Norte,
        "AL" | "BA" | "CE" | "MA" | "PB" | "PE" | "PI" | "RN" | "SE" => Regiao::Nordeste,
        "DF" | "GO" | "MS" | "MT" => Regiao::CentroOeste,
        "ES" | "MG" | "RJ" | "SP" => Regiao::Sudeste,
        "PR" | "RS" | "SC" => Regiao::Sul,
        _ => return None,
    };
    Some(regiao)
}

pub fn uf_conhecida(uf: &str) -> bool {
    ALIQUOTA_ICMS_INTERNA.contains_key(uf)
}

pub fn aliquota_icms_interna(uf: &str) -> Option<Decimal> {
    ALIQUOTA_ICMS_INTERNA.get(uf).copied()
}

/// Alíquota do ICMS em operação entre `origem` e `destino`.
///
/// * Mercadoria importada (Resolução do Senado 13/2012): 4%.
/// * Origem no Sul/Sudeste (exceto ES) com destino ao Norte, Nordeste,
///   Centro-Oeste ou ES: 7%.
/// * Demais operações interestaduais: 12%.
/// * Mesma UF: alíquota interna.
///
/// ```
/// use ingestao_fiscal::aliquota_icms_interestadual;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(aliquota_icms_interestadual("SP", "BA", false), Some(dec!(7)));
/// assert_eq!(aliquota_icms_interestadual("BA", "SP", false), Some(dec!(12)));
/// assert_eq!(aliquota_icms_interestadual("SP", "BA", true), Some(dec!(4)));
/// ```
pub fn aliquota_icms_interestadual(origem: &str, destino: &str, importado: bool) -> Option<Decimal> {
    let regiao_origem = regiao_da_uf(origem)?;
    let regiao_destino = regiao_da_uf(destino)?;

    if origem == destino {
        return aliquota_icms_interna(destino);
    }

    if importado {
        return Some(dec!(4));
    }

    let origem_sul_sudeste =
        matches!(regiao_origem, Regiao::Sul | Regiao::Sudeste) && origem != "ES";
    let destino_beneficiado = matches!(
        regiao_destino,
        Regiao::Norte | Regiao::Nordeste | Regiao::CentroOeste
    ) || destino == "ES";

    if origem_sul_sudeste && destino_beneficiado {
        Some(dec!(7))
    } else {
        Some(dec!(12))
    }
}

// --- Regras por prefixo de NCM ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReducaoBaseIcms {
    pub prefixo_ncm: &'static str,
    /// `None`: vale para todas as UFs.
    pub uf: Option<&'static str>,
    /// Percentual de redução da base de cálculo.
    pub percentual: Decimal,
    pub descricao: &'static str,
}

pub static REDUCOES_BASE_ICMS: LazyLock<Vec<ReducaoBaseIcms>> = LazyLock::new(|| {
    let regra = |prefixo_ncm, uf, percentual, descricao| ReducaoBaseIcms {
        prefixo_ncm,
        uf,
        percentual,
        descricao,
    };

    vec![
        // Convênio ICMS 52/91: máquinas e implementos agrícolas
        regra("8432", None, dec!(58.82), "Máquinas agrícolas para preparo do solo"),
        regra("8433", None, dec!(58.82), "Máquinas para colheita"),
        regra("8436", None, dec!(58.82), "Máquinas para avicultura e apicultura"),
        // Convênio ICMS 100/97: insumos agropecuários
        regra("3102", None, dec!(60), "Adubos minerais ou químicos nitrogenados"),
        regra("3105", None, dec!(60), "Adubos e fertilizantes compostos"),
        regra("3808", None, dec!(60), "Defensivos agrícolas"),
        regra("2309", None, dec!(60), "Rações para animais"),
        // Cesta básica (carga efetiva de 7%)
        regra("1006", Some("SP"), dec!(61.11), "Arroz - cesta básica"),
        regra("0713", Some("SP"), dec!(61.11), "Feijão - cesta básica"),
        regra("1101", Some("SP"), dec!(61.11), "Farinha de trigo - cesta básica"),
        regra("1006", Some("MG"), dec!(61.11), "Arroz - cesta básica"),
        regra("0401", None, dec!(41.67), "Leite fluido"),
        // Leite em pó: subposição específica prevalece sobre a posição 0401/0402
        regra("040221", Some("RS"), dec!(58.82), "Leite em pó integral"),
        regra("0402", None, dec!(29.41), "Leite concentrado"),
    ]
});

/// Regra de redução de maior prefixo compatível com o NCM e a UF.
pub fn reducao_base_icms(ncm: &str, uf: &str) -> Option<&'static ReducaoBaseIcms> {
    REDUCOES_BASE_ICMS
        .iter()
        .filter(|r| ncm.starts_with(r.prefixo_ncm))
        .filter(|r| r.uf.is_none_or(|u| u == uf))
        .max_by_key(|r| r.prefixo_ncm.len())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreditoPresumido {
    pub prefixo_ncm: &'static str,
    /// Percentual aplicado sobre as alíquotas de PIS/COFINS.
    pub percentual: Decimal,
    pub descricao: &'static str,
}

/// Crédito presumido da agroindústria (Lei 10.925/2004, art. 8º).
pub static CREDITOS_PRESUMIDOS: LazyLock<Vec<CreditoPresumido>> = LazyLock::new(|| {
    let credito = |prefixo_ncm, percentual, descricao| CreditoPresumido {
        prefixo_ncm,
        percentual,
        descricao,
    };

    vec![
        credito("02", dec!(60), "Carnes e miudezas comestíveis"),
        credito("0401", dec!(60), "Leite in natura"),
        credito("0402", dec!(60), "Leite concentrado"),
        credito("1201", dec!(50), "Soja em grão"),
        credito("0901", dec!(35), "Café"),
        credito("1001", dec!(35), "Trigo"),
        credito("1005", dec!(35), "Milho"),
        credito("1006", dec!(35), "Arroz"),
        credito("0713", dec!(35), "Feijão e leguminosas"),
    ]
});

pub fn credito_presumido(ncm: &str) -> Option<&'static CreditoPresumido> {
    CREDITOS_PRESUMIDOS
        .iter()
        .filter(|c| ncm.starts_with(c.prefixo_ncm))
        .max_by_key(|c| c.prefixo_ncm.len())
}

// --- PIS/COFINS ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RegimePisCofins {
    /// Lucro presumido (Lei 9.718/1998)
    Cumulativo,
    /// Lucro real (Leis 10.637/2002 e 10.833/2003)
    NaoCumulativo,
}

impl RegimePisCofins {
    pub fn aliquota_pis(&self) -> Decimal {
        match self {
            RegimePisCofins::Cumulativo => dec!(0.65),
            RegimePisCofins::NaoCumulativo => dec!(1.65),
        }
    }

    pub fn aliquota_cofins(&self) -> Decimal {
        match self {
            RegimePisCofins::Cumulativo => dec!(3),
            RegimePisCofins::NaoCumulativo => dec!(7.6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn todas_as_ufs_tem_aliquota_e_regiao() {
        assert_eq!(ALIQUOTA_ICMS_INTERNA.len(), 27);
        for uf in ALIQUOTA_ICMS_INTERNA.keys() {
            assert!(regiao_da_uf(uf).is_some(), "{uf}");
        }
        assert!(!uf_conhecida("XX"));
        assert_eq!(aliquota_icms_interna("SP"), Some(dec!(18)));
    }

    #[test]
    fn interestadual() {
        assert_eq!(aliquota_icms_interestadual("PR", "GO", false), Some(dec!(7)));
        assert_eq!(aliquota_icms_interestadual("SP", "ES", false), Some(dec!(7)));
        // ES não é tratado como Sudeste na origem
        assert_eq!(aliquota_icms_interestadual("ES", "BA", false), Some(dec!(12)));
        assert_eq!(aliquota_icms_interestadual("SP", "RJ", false), Some(dec!(12)));
        assert_eq!(aliquota_icms_interestadual("AM", "PA", false), Some(dec!(12)));
        assert_eq!(aliquota_icms_interestadual("RJ", "RJ", false), Some(dec!(22)));
        assert_eq!(aliquota_icms_interestadual("SP", "XX", false), None);
    }

    #[test]
    fn reducao_maior_prefixo_prevalece() {
        let leite_rs = reducao_base_icms("04022110", "RS").unwrap();
        assert_eq!(leite_rs.prefixo_ncm, "040221");

        let leite_sp = reducao_base_icms("04022110", "SP").unwrap();
        assert_eq!(leite_sp.prefixo_ncm, "0402");
    }

    #[test]
    fn reducao_restrita_por_uf() {
        assert!(reducao_base_icms("10063021", "SP").is_some());
        assert!(reducao_base_icms("10063021", "BA").is_none());
        assert!(reducao_base_icms("84339090", "BA").is_some());
        assert!(reducao_base_icms("22030000", "SP").is_none());
    }

    #[test]
    fn credito_presumido_por_ncm() {
        assert_eq!(credito_presumido("02013000").unwrap().percentual, dec!(60));
        assert_eq!(credito_presumido("12019000").unwrap().percentual, dec!(50));
        assert!(credito_presumido("22030000").is_none());
    }

    #[test]
    fn aliquotas_pis_cofins() {
        assert_eq!(RegimePisCofins::Cumulativo.aliquota_pis(), dec!(0.65));
        assert_eq!(RegimePisCofins::Cumulativo.aliquota_cofins(), dec!(3));
        assert_eq!(RegimePisCofins::NaoCumulativo.aliquota_pis(), dec!(1.65));
        assert_eq!(RegimePisCofins::NaoCumulativo.aliquota_cofins(), dec!(7.6));
    }
}
