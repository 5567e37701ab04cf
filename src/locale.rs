//! Números e datas no padrão brasileiro.
//!
//! `1.234,56` usa ponto como separador de milhar e vírgula como separador
//! decimal. Os mesmos parsers aceitam a notação dos XML fiscais (`1234.56`).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::{borrow::Cow, str::FromStr};

use tracing::debug;

use crate::{FormatError, FormatIssue};

/// Texto de arquivo fiscal: UTF-8 quando válido, senão Latin-1/Windows-1252
/// (codificação oficial dos arquivos Sped).
pub fn decodificar_texto(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(texto) => Cow::Borrowed(texto.trim_start_matches('\u{feff}')),
        Err(_) => encoding_rs::WINDOWS_1252.decode(bytes).0,
    }
}

/// Converte um valor monetário/quantidade para `Decimal`.
///
/// Regras de separador:
/// - vírgula e ponto presentes: o mais à direita é o decimal;
/// - só vírgula: vírgula decimal;
/// - só pontos, mais de um: pontos de milhar;
/// - um único ponto: ponto decimal (notação dos XML).
///
/// ```
/// use ingestao_fiscal::parse_decimal_br;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(parse_decimal_br("1.234,56").unwrap(), dec!(1234.56));
/// assert_eq!(parse_decimal_br("1000.00").unwrap(), dec!(1000.00));
/// assert!(parse_decimal_br("12,a4").is_err());
/// ```
pub fn parse_decimal_br(valor: &str) -> Result<Decimal, FormatError> {
    let mut s: String = valor
        .trim()
        .trim_start_matches("R$")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if s.is_empty() {
        return Err(FormatError::new(valor, "valor vazio"));
    }

    // Negativo contábil: (1.234,56)
    let entre_parenteses = s.len() > 2 && s.starts_with('(') && s.ends_with(')');
    if entre_parenteses {
        s = s[1..s.len() - 1].to_string();
    }

    let normalizado = match (s.rfind(','), s.rfind('.')) {
        (Some(virgula), Some(ponto)) if virgula > ponto => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) => s.replace(',', "."),
        (None, Some(_)) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s,
    };

    let caracteres_validos = normalizado
        .chars()
        .enumerate()
        .all(|(i, c)| c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+')));

    if !caracteres_validos {
        return Err(FormatError::new(valor, "não é um número válido"));
    }

    let numero = Decimal::from_str(&normalizado)
        .map_err(|e| FormatError::new(valor, format!("não é um número válido ({e})")))?;

    Ok(if entre_parenteses { -numero } else { numero })
}

/// Formata com duas casas decimais no padrão brasileiro: `1.234,56`.
pub fn format_decimal_br(valor: Decimal) -> String {
    let arredondado = valor.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let texto = format!("{:.2}", arredondado.abs());
    let (inteiro, fracao) = texto.split_once('.').unwrap_or((texto.as_str(), "00"));

    let sinal = if arredondado.is_sign_negative() && !arredondado.is_zero() {
        "-"
    } else {
        ""
    };

    format!("{sinal}{},{fracao}", agrupar_milhares(inteiro))
}

/// Insere pontos de milhar numa sequência de dígitos.
fn agrupar_milhares(digitos: &str) -> String {
    let len = digitos.len();
    let mut result = String::with_capacity(len + len / 3);

    digitos.chars().enumerate().for_each(|(i, c)| {
        // Adiciona o ponto se:
        // 1. Não for o primeiro caractere (i > 0)
        // 2. A distância até o fim for múltipla de 3
        if i > 0 && (len - i).is_multiple_of(3) {
            result.push('.');
        }
        result.push(c);
    });

    result
}

pub fn fmt_milhares(n: usize) -> String {
    agrupar_milhares(&n.to_string())
}

/// Datas em `dd/mm/aaaa`, `ddmmaaaa` (Sped), `aaaa-mm-dd` ou `dd-mm-aaaa`.
pub fn parse_date_br(valor: &str) -> Result<NaiveDate, FormatError> {
    let s = valor.trim();

    // Sped: ddmmaaaa, sem separadores
    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        let (dia, mes, ano) = (&s[0..2], &s[2..4], &s[4..8]);
        return match (ano.parse(), mes.parse(), dia.parse()) {
            (Ok(a), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(a, m, d)
                .ok_or_else(|| FormatError::new(valor, "data inexistente no calendário")),
            _ => Err(FormatError::new(valor, "data inválida")),
        };
    }

    ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"]
        .iter()
        .find_map(|formato| NaiveDate::parse_from_str(s, formato).ok())
        .ok_or_else(|| FormatError::new(valor, "data inválida"))
}

pub fn format_date_br(data: NaiveDate) -> String {
    data.format("%d/%m/%Y").to_string()
}

/// Horário oficial de Brasília (UTC-03:00), assumido quando o XML não traz fuso.
pub fn fuso_brasilia() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).unwrap_or_else(|| Utc.fix())
}

/// Data/hora de emissão dos XML fiscais.
///
/// Aceita RFC 3339 (`dhEmi`), data-hora sem fuso (NFS-e) ou apenas a data (`dEmi`).
pub fn parse_datetime_fiscal(valor: &str) -> Result<DateTime<FixedOffset>, FormatError> {
    let s = valor.trim();

    if let Ok(data_hora) = DateTime::parse_from_rfc3339(s) {
        return Ok(data_hora);
    }

    let local = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .or_else(|| parse_date_br(s).ok().and_then(|d| d.and_hms_opt(0, 0, 0)))
        .ok_or_else(|| FormatError::new(valor, "data/hora inválida"))?;

    local
        .and_local_timezone(fuso_brasilia())
        .single()
        .ok_or_else(|| FormatError::new(valor, "data/hora ambígua"))
}

/// Aplica a política de degradação: valor ilegível vira zero/vazio e o erro
/// fica registrado, nunca descartado.
///
/// Campo ausente (texto vazio) não é erro: resulta em zero sem registro, o
/// que permite distinguir "zero de fato" de "zero por falha de leitura".
#[derive(Debug, Default)]
pub struct FormatCollector {
    issues: Vec<FormatIssue>,
}

impl FormatCollector {
    pub fn decimal(&mut self, campo: &str, bruto: &str) -> Decimal {
        if bruto.trim().is_empty() {
            return Decimal::ZERO;
        }
        parse_decimal_br(bruto).unwrap_or_else(|e| {
            self.registrar_erro(campo, e);
            Decimal::ZERO
        })
    }

    pub fn data(&mut self, campo: &str, bruto: &str) -> Option<NaiveDate> {
        if bruto.trim().is_empty() {
            return None;
        }
        parse_date_br(bruto)
            .map_err(|e| self.registrar_erro(campo, e))
            .ok()
    }

    pub fn data_hora(&mut self, campo: &str, bruto: &str) -> Option<DateTime<FixedOffset>> {
        if bruto.trim().is_empty() {
            return None;
        }
        parse_datetime_fiscal(bruto)
            .map_err(|e| self.registrar_erro(campo, e))
            .ok()
    }

    pub fn registrar(&mut self, campo: &str, valor: &str, motivo: &str) {
        debug!(campo, valor, motivo, "campo substituído pelo valor padrão");
        self.issues.push(FormatIssue {
            campo: campo.to_string(),
            valor: valor.to_string(),
            motivo: motivo.to_string(),
        });
    }

    fn registrar_erro(&mut self, campo: &str, erro: FormatError) {
        self.registrar(campo, &erro.valor, &erro.motivo);
    }

    pub fn into_issues(self) -> Vec<FormatIssue> {
        self.issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_brasileiro() {
        assert_eq!(parse_decimal_br("1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal_br("0,00").unwrap(), Decimal::ZERO);
        assert_eq!(parse_decimal_br("-1.234,56").unwrap(), dec!(-1234.56));
        assert_eq!(parse_decimal_br("1.234.567.890,12").unwrap(), dec!(1234567890.12));
        assert_eq!(parse_decimal_br("R$ 10,50").unwrap(), dec!(10.50));
        assert_eq!(parse_decimal_br("(2,00)").unwrap(), dec!(-2.00));
        assert_eq!(parse_decimal_br("1234,5").unwrap(), dec!(1234.5));
    }

    #[test]
    fn decimal_notacao_xml_e_americana() {
        assert_eq!(parse_decimal_br("1000.00").unwrap(), dec!(1000.00));
        assert_eq!(parse_decimal_br("0.0100").unwrap(), dec!(0.01));
        assert_eq!(parse_decimal_br("1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal_br("1.234.567").unwrap(), dec!(1234567));
        assert_eq!(parse_decimal_br("42").unwrap(), dec!(42));
    }

    #[test]
    fn decimal_invalido_e_format_error() {
        for entrada in ["", "   ", "abc", "1,2,3", "12,a4", "1_000", "--1", "1-2"] {
            let err = parse_decimal_br(entrada).unwrap_err();
            assert_eq!(err.valor, entrada);
        }
    }

    #[test]
    fn formatacao_brasileira() {
        assert_eq!(format_decimal_br(dec!(1234.56)), "1.234,56");
        assert_eq!(format_decimal_br(dec!(0)), "0,00");
        assert_eq!(format_decimal_br(dec!(-1234567.891)), "-1.234.567,89");
        assert_eq!(format_decimal_br(dec!(0.005)), "0,01");
        assert_eq!(format_decimal_br(dec!(-0.001)), "0,00");
        assert_eq!(format_decimal_br(dec!(999)), "999,00");
    }

    #[test]
    fn ida_e_volta() {
        for s in ["1.234,56", "0,00", "-98.765,43", "123.456.789.012,99", "7,10"] {
            let valor = parse_decimal_br(s).unwrap();
            assert_eq!(format_decimal_br(valor), s);
            assert_eq!(parse_decimal_br(&format_decimal_br(valor)).unwrap(), valor);
        }
    }

    #[test]
    fn decodifica_latin1() {
        assert_eq!(decodificar_texto("ação".as_bytes()), "ação");
        assert_eq!(decodificar_texto(b"a\xe7\xe3o"), "ação");
        assert_eq!(decodificar_texto("\u{feff}|0000|".as_bytes()), "|0000|");
    }

    #[test]
    fn coletor_distingue_ausente_de_ilegivel() {
        let mut coletor = FormatCollector::default();

        assert_eq!(coletor.decimal("vNF", ""), Decimal::ZERO);
        assert_eq!(coletor.decimal("vProd", "0,00"), Decimal::ZERO);
        assert_eq!(coletor.decimal("vDesc", "dez reais"), Decimal::ZERO);
        assert_eq!(coletor.data("DT_DOC", "32012024"), None);

        let issues = coletor.into_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].campo, "vDesc");
        assert_eq!(issues[0].valor, "dez reais");
        assert_eq!(issues[1].campo, "DT_DOC");
    }

    #[test]
    fn milhares() {
        assert_eq!(fmt_milhares(0), "0");
        assert_eq!(fmt_milhares(999), "999");
        assert_eq!(fmt_milhares(1000), "1.000");
        assert_eq!(fmt_milhares(1234567), "1.234.567");
    }

    #[test]
    fn datas() {
        let esperado = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(parse_date_br("29/02/2024").unwrap(), esperado);
        assert_eq!(parse_date_br("29022024").unwrap(), esperado);
        assert_eq!(parse_date_br("2024-02-29").unwrap(), esperado);
        assert_eq!(format_date_br(esperado), "29/02/2024");

        assert!(parse_date_br("29022023").is_err());
        assert!(parse_date_br("31/04/2024").is_err());
        assert!(parse_date_br("ontem").is_err());
    }

    #[test]
    fn data_hora_de_emissao() {
        let dh = parse_datetime_fiscal("2024-01-15T10:30:00-03:00").unwrap();
        assert_eq!(dh.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(dh.date_naive(), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());

        let sem_fuso = parse_datetime_fiscal("2024-01-15T10:30:00").unwrap();
        assert_eq!(sem_fuso.offset(), &fuso_brasilia());

        let so_data = parse_datetime_fiscal("2024-01-15").unwrap();
        assert_eq!(so_data.to_rfc3339(), "2024-01-15T00:00:00-03:00");

        assert!(parse_datetime_fiscal("2024-13-01").is_err());
    }
}
