//! Upstream endpoints and field mappings for the compras.gov.br open data entities.
//!
//! Each module describes one entity: where it is served, which query
//! parameters bound its date windows, and how upstream fields map onto the
//! columns of its table. The engine in `compras-sync` turns these into jobs.

use compras_core::EntitySpec;
use compras_storage::Endpoint;

pub mod arp;
pub mod arp_item;
pub mod contratacao_itens;
pub mod contratacoes;
pub mod licitacao;

pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.compras.gov.br";

/// An upstream endpoint and the path spellings it has been served under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityEndpoint {
    /// Name recorded in the raw archive.
    pub name: &'static str,
    pub paths: &'static [&'static str],
}

impl EntityEndpoint {
    pub fn resolve(&self, bases: &[String]) -> Endpoint {
        Endpoint::new(self.name, bases, self.paths)
    }
}

/// Query parameters carrying the inclusive bounds of a date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateParams {
    pub from: &'static str,
    pub to: &'static str,
}

pub fn all_entities() -> [&'static EntitySpec; 5] {
    [
        &arp::ENTITY,
        &arp_item::ENTITY,
        &contratacoes::ENTITY,
        &contratacao_itens::ENTITY,
        &licitacao::ENTITY,
    ]
}
