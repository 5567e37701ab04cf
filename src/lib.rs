mod args;
mod error;
mod extratores;
mod identificadores;
mod integridade;
mod locale;
mod metadata;
mod models;
mod parser;
mod regex;
mod saida;
mod sped_efd;
mod tabelas;
mod validacao;
mod xml_dom;
mod xml_fiscal;

pub use self::{
    args::*, error::*, extratores::*, identificadores::*, integridade::*, locale::*, metadata::*,
    models::*, parser::*, regex::*, saida::*, sped_efd::*, tabelas::*, validacao::*, xml_dom::*,
    xml_fiscal::*,
};
