//! The five ingestion jobs, configured from a [`SyncConfig`].

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use compras_entities::{arp, arp_item, contratacao_itens, contratacoes, licitacao};

use crate::config::SyncConfig;
use crate::job::IngestJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Arp,
    ArpItem,
    Contratacoes,
    ContratacaoItens,
    Licitacao,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::Arp,
        JobKind::ArpItem,
        JobKind::Contratacoes,
        JobKind::ContratacaoItens,
        JobKind::Licitacao,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Arp => "arp",
            JobKind::ArpItem => "arp-item",
            JobKind::Contratacoes => "contratacoes",
            JobKind::ContratacaoItens => "contratacao-itens",
            JobKind::Licitacao => "licitacao",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            JobKind::Arp => "price-registration acts of the unit, windowed by validity start",
            JobKind::ArpItem => "items of known acts, new or re-seen acts first",
            JobKind::Contratacoes => "PNCP 14.133 purchases, windowed by publication date, per modality",
            JobKind::ContratacaoItens => "items of known PNCP purchases, by idCompra",
            JobKind::Licitacao => "legacy tenders of the UASG, windowed by publication date",
        }
    }

    pub fn build(self, config: &SyncConfig) -> IngestJob {
        let bases = &config.base_urls;
        match self {
            JobKind::Arp => IngestJob::windowed(self.as_str(), arp::ENDPOINT.resolve(bases), &arp::ENTITY, arp::DATES)
                .with_param(arp::UNIT_PARAM, &config.unidade)
                .page_size(config.page_size),
            JobKind::ArpItem => IngestJob::targeted(
                self.as_str(),
                arp_item::ENDPOINT.resolve(bases),
                &arp_item::ENTITY,
                arp_item::pending_acts(&config.unidade, config.target_limit),
            ),
            JobKind::Contratacoes => IngestJob::windowed(
                self.as_str(),
                contratacoes::ENDPOINT.resolve(bases),
                &contratacoes::ENTITY,
                contratacoes::DATES,
            )
            .with_param(contratacoes::UNIT_PARAM, &config.unidade)
            .partitioned_by(contratacoes::MODALITY_PARAM, &config.modalidades)
            .page_size(config.page_size)
            .stop_on_declared_total(true),
            JobKind::ContratacaoItens => IngestJob::targeted(
                self.as_str(),
                contratacao_itens::ENDPOINT.resolve(bases),
                &contratacao_itens::ENTITY,
                contratacao_itens::purchase_ids(config.target_limit),
            )
            .with_param(contratacao_itens::TYPE_PARAM.0, contratacao_itens::TYPE_PARAM.1),
            JobKind::Licitacao => IngestJob::windowed(
                self.as_str(),
                licitacao::ENDPOINT.resolve(bases),
                &licitacao::ENTITY,
                licitacao::DATES,
            )
            .with_param(licitacao::UNIT_PARAM, &config.unidade)
            .page_size(config.page_size),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "-");
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<_> = JobKind::ALL.iter().map(|k| k.as_str()).collect();
                anyhow!("unknown job `{s}`; expected one of: {}", known.join(", "))
            })
    }
}
