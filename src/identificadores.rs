//! Dígitos verificadores de CNPJ, CPF e chave de acesso de 44 dígitos.
//!
//! Todas as funções são puras e totais: qualquer string de entrada produz
//! `true`/`false`, nunca pânico.

use std::borrow::Cow;

use crate::{RE_CHAVE_44, RE_NON_DIGITS, get_modelo_documentos_fiscais};

/// Remove tudo que não for dígito ASCII.
pub fn somente_digitos(valor: &str) -> Cow<'_, str> {
    RE_NON_DIGITS.replace_all(valor, "")
}

/// Todos os caracteres iguais (ex.: "00000000000000"): rejeitado mesmo que o DV confira.
fn digitos_repetidos(digitos: &[u32]) -> bool {
    digitos.windows(2).all(|par| par[0] == par[1])
}

fn para_digitos(valor: &str) -> Vec<u32> {
    valor.chars().filter_map(|c| c.to_digit(10)).collect()
}

/// Dígito verificador módulo 11 com pesos 2..9 ciclando a partir da direita.
///
/// Resto menor que 2 resulta em 0; caso contrário, `11 - resto`.
/// É o cálculo do CNPJ e da chave de acesso.
pub fn digito_modulo_11(digitos: &[u32]) -> u32 {
    let soma: u32 = digitos
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| d * (2 + (i as u32 % 8)))
        .sum();

    match soma % 11 {
        resto if resto < 2 => 0,
        resto => 11 - resto,
    }
}

/// Valida um CNPJ de 14 dígitos (pontuação é ignorada).
///
/// ```
/// use ingestao_fiscal::validar_cnpj;
///
/// assert!(validar_cnpj("11.222.333/0001-81"));
/// assert!(validar_cnpj("11222333000181"));
/// assert!(!validar_cnpj("11.222.333/0001-82"));
/// assert!(!validar_cnpj("00.000.000/0000-00"));
/// ```
pub fn validar_cnpj(valor: &str) -> bool {
    let digitos = para_digitos(&somente_digitos(valor));

    if digitos.len() != 14 || digitos_repetidos(&digitos) {
        return false;
    }

    // 1º DV sobre os 12 primeiros dígitos; 2º DV sobre os 13 (inclui o 1º DV)
    digito_modulo_11(&digitos[..12]) == digitos[12]
        && digito_modulo_11(&digitos[..13]) == digitos[13]
}

/// Valida um CPF de 11 dígitos (pontuação é ignorada).
pub fn validar_cpf(valor: &str) -> bool {
    let digitos = para_digitos(&somente_digitos(valor));

    if digitos.len() != 11 || digitos_repetidos(&digitos) {
        return false;
    }

    // Pesos decrescentes: 10..2 para o 1º DV, 11..2 para o 2º DV.
    let dv = |base: &[u32]| -> u32 {
        let peso_inicial = base.len() as u32 + 1;
        let soma: u32 = base
            .iter()
            .enumerate()
            .map(|(i, d)| d * (peso_inicial - i as u32))
            .sum();
        match 11 - (soma % 11) {
            10 | 11 => 0,
            digito => digito,
        }
    };

    dv(&digitos[..9]) == digitos[9] && dv(&digitos[..10]) == digitos[10]
}

/// Valida a chave de acesso de 44 dígitos (NF-e, CT-e, MDF-e, ...).
pub fn validar_chave_acesso(valor: &str) -> bool {
    let limpa = somente_digitos(valor);

    if !RE_CHAVE_44.is_match(&limpa) {
        return false;
    }

    let digitos = para_digitos(&limpa);
    digito_modulo_11(&digitos[..43]) == digitos[43]
}

/// Código do modelo (posições 21-22) da chave de acesso.
pub fn modelo_da_chave(chave: &str) -> Option<&str> {
    if chave.len() == 44 && chave.is_ascii() {
        chave.get(20..22)
    } else {
        None
    }
}

/// Descrição do modelo de documento fiscal embutido na chave.
pub fn descrever_chave(chave: &str) -> &'static str {
    modelo_da_chave(chave)
        .map(get_modelo_documentos_fiscais)
        .unwrap_or("Modelo Desconhecido")
}
