//! Items of price-registration acts, fetched one act at a time.

use compras_core::{EntitySpec, FieldKind, FieldMapping};
use compras_storage::TargetQuery;

use crate::EntityEndpoint;

pub const ENDPOINT: EntityEndpoint = EntityEndpoint {
    name: "modulo-arp/2.1_consultarARPItem_Id",
    paths: &["/modulo-arp/2.1_consultarARPItem_Id"],
};

pub const ACT_PARAM: &str = "numeroControlePncpAta";
pub const UNIT_CONTEXT: &str = "codigoUnidadeGerenciadora";

const FIELDS: &[FieldMapping] = &[
    FieldMapping::new("codigo_unidade_gerenciadora", FieldKind::Integer, &["codigoUnidadeGerenciadora"])
        .or_context(UNIT_CONTEXT),
    FieldMapping::new("numero_controle_pncp_ata", FieldKind::Text, &["numeroControlePncpAta"])
        .or_context(ACT_PARAM),
    FieldMapping::new("numero_item", FieldKind::Text, &["numeroItem"]),
    FieldMapping::new("numero_ata_registro_preco", FieldKind::Text, &["numeroAtaRegistroPreco"]),
    FieldMapping::new("codigo_item", FieldKind::Integer, &["codigoItem"]),
    FieldMapping::new("tipo_item", FieldKind::Text, &["tipoItem"]),
    FieldMapping::new("descricao", FieldKind::Text, &["descricaoItem"]),
    FieldMapping::new(
        "quantidade",
        FieldKind::Decimal,
        &["quantidadeHomologadaVencedor", "quantidadeHomologadaItem"],
    ),
    FieldMapping::new("valor_unitario", FieldKind::Decimal, &["valorUnitario"]),
    FieldMapping::new("valor_total", FieldKind::Decimal, &["valorTotal"]),
    FieldMapping::new("maximo_adesao", FieldKind::Decimal, &["maximoAdesao"]),
    FieldMapping::new("classificacao_fornecedor", FieldKind::Text, &["classificacaoFornecedor"]),
    FieldMapping::new("ni_fornecedor", FieldKind::Text, &["niFornecedor"]),
    FieldMapping::new("nome_fornecedor", FieldKind::Text, &["nomeRazaoSocialFornecedor"]),
    FieldMapping::new("situacao_sicaf", FieldKind::Text, &["situacaoSicaf"]),
    FieldMapping::new("codigo_pdm", FieldKind::Integer, &["codigoPdm"]),
    FieldMapping::new("nome_pdm", FieldKind::Text, &["nomePdm"]),
    FieldMapping::new("numero_compra", FieldKind::Text, &["numeroCompra"]),
    FieldMapping::new("ano_compra", FieldKind::Integer, &["anoCompra"]),
    FieldMapping::new("codigo_modalidade_compra", FieldKind::Integer, &["codigoModalidadeCompra"]),
    FieldMapping::new("id_compra", FieldKind::Text, &["idCompra"]),
    FieldMapping::new("numero_controle_pncp_compra", FieldKind::Text, &["numeroControlePncpCompra"]),
    FieldMapping::new("data_hora_inclusao", FieldKind::Timestamp, &["dataHoraInclusao"]),
    FieldMapping::new("data_hora_atualizacao", FieldKind::Timestamp, &["dataHoraAtualizacao"]),
    FieldMapping::new("data_hora_exclusao", FieldKind::Timestamp, &["dataHoraExclusao"]),
    FieldMapping::new("item_excluido", FieldKind::Bool, &["itemExcluido"]),
];

pub const ENTITY: EntitySpec = EntitySpec {
    name: "arp_item",
    table: "arp_item",
    natural_key: &["codigo_unidade_gerenciadora", "numero_controle_pncp_ata", "numero_item"],
    fields: FIELDS,
};

/// Acts of the unit never fetched, or seen again since their items were last
/// fetched; least recently fetched first. Binds: unit code, limit.
const PENDING_ACTS_SQL: &str = r#"
SELECT a.codigo_unidade_gerenciadora::text AS codigo_unidade_gerenciadora,
       a.numero_controle_pncp_ata
FROM arp a
LEFT JOIN etl_target_fetch f
  ON f.query = 'arp_item_pending_acts'
 AND f.target_key = a.numero_controle_pncp_ata
WHERE a.codigo_unidade_gerenciadora = $1::bigint
  AND a.numero_controle_pncp_ata IS NOT NULL
  AND a.numero_controle_pncp_ata <> ''
  AND (f.fetched_at IS NULL OR a.last_seen_at > f.fetched_at)
ORDER BY f.fetched_at ASC NULLS FIRST, a.last_seen_at DESC
LIMIT $2::bigint
"#;

pub fn pending_acts(unit: &str, limit: u32) -> TargetQuery {
    TargetQuery {
        name: "arp_item_pending_acts",
        sql: PENDING_ACTS_SQL,
        binds: vec![unit.to_string(), limit.to_string()],
        params: &[("numero_controle_pncp_ata", ACT_PARAM)],
        context: &[("codigo_unidade_gerenciadora", UNIT_CONTEXT)],
    }
}
