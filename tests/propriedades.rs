//! Propriedades dos validadores de identificadores e das conversões numéricas.

use ingestao_fiscal::{
    digito_modulo_11, format_decimal_br, parse_decimal_br, validar_chave_acesso, validar_cnpj,
    validar_cpf,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// CNPJ com DVs calculados a partir de 12 dígitos de base.
fn cnpj_com_dv(base: &[u32]) -> Vec<u32> {
    let mut digitos = base.to_vec();
    digitos.push(digito_modulo_11(&digitos));
    digitos.push(digito_modulo_11(&digitos));
    digitos
}

fn texto(digitos: &[u32]) -> String {
    digitos.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect()
}

fn pontuado(cnpj: &str) -> String {
    format!(
        "{}.{}.{}/{}-{}",
        &cnpj[0..2],
        &cnpj[2..5],
        &cnpj[5..8],
        &cnpj[8..12],
        &cnpj[12..14]
    )
}

fn arb_base_cnpj() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..10, 12).prop_filter("dígitos todos iguais", |base| {
        base.windows(2).any(|par| par[0] != par[1])
    })
}

proptest! {
    #[test]
    fn digitos_repetidos_nunca_validam(d in 0u32..10) {
        let c = char::from_digit(d, 10).unwrap();
        prop_assert!(!validar_cnpj(&c.to_string().repeat(14)));
        prop_assert!(!validar_cpf(&c.to_string().repeat(11)));
    }

    #[test]
    fn cnpj_com_dv_calculado_valida_com_ou_sem_pontuacao(base in arb_base_cnpj()) {
        let cnpj = texto(&cnpj_com_dv(&base));
        prop_assert!(validar_cnpj(&cnpj));
        prop_assert!(validar_cnpj(&pontuado(&cnpj)));
    }

    #[test]
    fn alterar_um_dv_invalida_o_cnpj(base in arb_base_cnpj(), posicao in 12usize..14, delta in 1u32..10) {
        let mut digitos = cnpj_com_dv(&base);
        digitos[posicao] = (digitos[posicao] + delta) % 10;
        prop_assert!(!validar_cnpj(&texto(&digitos)));
    }

    #[test]
    fn validadores_sao_totais(s in ".{0,60}") {
        // Qualquer entrada produz uma resposta, sem pânico
        let _ = validar_cnpj(&s);
        let _ = validar_cpf(&s);
        let _ = validar_chave_acesso(&s);
        let _ = parse_decimal_br(&s);
    }

    #[test]
    fn chave_com_dv_alterado_e_invalida(base in prop::collection::vec(0u32..10, 43), delta in 1u32..10) {
        let mut digitos = base.clone();
        digitos.push(digito_modulo_11(&base));
        prop_assert!(validar_chave_acesso(&texto(&digitos)));

        digitos[43] = (digitos[43] + delta) % 10;
        prop_assert!(!validar_chave_acesso(&texto(&digitos)));
    }

    #[test]
    fn decimal_brasileiro_ida_e_volta(centavos in -1_000_000_000_000i64..1_000_000_000_000i64) {
        let valor = Decimal::new(centavos, 2);
        let formatado = format_decimal_br(valor);
        prop_assert_eq!(parse_decimal_br(&formatado).unwrap(), valor);
    }
}

#[test]
fn exemplos_de_ida_e_volta() {
    for (texto, centavos) in [
        ("1.234,56", 123456),
        ("0,00", 0),
        ("-1.234,56", -123456),
        ("1.234.567.890,12", 123456789012),
    ] {
        let valor = parse_decimal_br(texto).unwrap();
        assert_eq!(valor, Decimal::new(centavos, 2));
        assert_eq!(format_decimal_br(valor), texto);
    }
}
