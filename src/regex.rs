use regex::Regex;
use std::sync::LazyLock;

/// Arquivos aceitos na busca por diretório.
/// i: case-insensitive
/// x: modo verbose (ignora espaços e permite comentários)
pub static REGEX_ARQUIVO_FISCAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^ .+ \.
        (?: xml | txt | xlsx | xls | csv | pdf ) # Extensões com parser associado
        $
        ",
    )
    .unwrap()
});

/// Nomes de arquivo que indicam planilha/CSV de regras tributárias.
pub static REGEX_TABELA_REGRAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(regra|aliquota|alíquota|tabela|ncm|tribut|beneficio|benefício)").unwrap()
});

/// Nomes de arquivo que indicam documento de programa estadual de benefício fiscal.
pub static REGEX_PROGRAMA_BENEFICIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        (
            prodepe | provin | fomentar | produzir | desenvolve | proadi |
            prodec | fundap | proind | beneficio | benefício | incentivo
        )
        ",
    )
    .unwrap()
});

// Varredura heurística de conteúdo (integridade)
pub static RE_CNPJ_FORMATO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2}\b").unwrap()
});
pub static RE_DATA_FORMATO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{2}/\d{2}/\d{4}|\d{4}-\d{2}-\d{2})\b").unwrap()
});
pub static RE_VALOR_MONETARIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:R\$\s*)?\b\d{1,3}(?:\.\d{3})*,\d{2}\b").unwrap()
});

// Limpeza e validação
pub static RE_MULTISPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").unwrap());
pub static RE_NON_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]").unwrap());
pub static RE_CHAVE_44: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([0-9]{44})$").unwrap());

/// Linha de tabela de benefício em texto extraído de PDF: NCM seguido de percentual.
pub static RE_LINHA_BENEFICIO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<ncm> \d{4}(?:\.?\d{2}){0,2} ) # NCM completo ou por posição/subposição
        \b .*? \b
        (?P<pct> \d{1,3}(?:,\d{1,4})? ) \s* %
        ",
    )
    .unwrap()
});
