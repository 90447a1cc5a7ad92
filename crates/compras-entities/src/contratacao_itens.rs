//! Items of PNCP purchases, fetched per known purchase id.

use compras_core::{EntitySpec, FieldKind, FieldMapping};
use compras_storage::TargetQuery;

use crate::EntityEndpoint;

pub const ENDPOINT: EntityEndpoint = EntityEndpoint {
    name: "modulo-contratacoes/2.1_consultarItensContratacoes_PNCP_14133_Id",
    paths: &["/modulo-contratacoes/2.1_consultarItensContratacoes_PNCP_14133_Id"],
};

/// The item endpoint is queried as `?tipo=idCompra&codigo=<id>`.
pub const TYPE_PARAM: (&str, &str) = ("tipo", "idCompra");
pub const ID_PARAM: &str = "codigo";
pub const ID_CONTEXT: &str = "idCompra";

const FIELDS: &[FieldMapping] = &[
    FieldMapping::new("id_compra", FieldKind::Text, &["idCompra"]).or_context(ID_CONTEXT),
    FieldMapping::new("numero_item", FieldKind::Integer, &["numeroItemCompra", "numeroItemPncp"]),
    FieldMapping::new("id_compra_item", FieldKind::Text, &["idCompraItem"]),
    FieldMapping::new("id_contratacao_pncp", FieldKind::Text, &["idContratacaoPNCP", "idContratacaoPncp"]),
    FieldMapping::new("unidade_orgao_codigo_unidade", FieldKind::Text, &["unidadeOrgaoCodigoUnidade"]),
    FieldMapping::new("orgao_entidade_cnpj", FieldKind::Text, &["orgaoEntidadeCnpj"]),
    FieldMapping::new("material_ou_servico", FieldKind::Text, &["materialOuServicoNome", "materialOuServico"]),
    FieldMapping::new("codigo_classe", FieldKind::Integer, &["codClasse"]),
    FieldMapping::new("codigo_grupo", FieldKind::Integer, &["codGrupo"]),
    FieldMapping::new("codigo_item_catalogo", FieldKind::Integer, &["codItemCatalogo"]),
    FieldMapping::new("descricao_resumida", FieldKind::Text, &["descricaoResumida", "descricao"]),
    FieldMapping::new("descricao_detalhada", FieldKind::Text, &["descricaodetalhada", "descricaoDetalhada"]),
    FieldMapping::new("unidade_medida", FieldKind::Text, &["unidadeMedida"]),
    FieldMapping::new("quantidade", FieldKind::Decimal, &["quantidade"]),
    FieldMapping::new("valor_unitario_estimado", FieldKind::Decimal, &["valorUnitarioEstimado"]),
    FieldMapping::new("valor_total", FieldKind::Decimal, &["valorTotal"]),
    FieldMapping::new("valor_unitario_resultado", FieldKind::Decimal, &["valorUnitarioResultado"]),
    FieldMapping::new("valor_total_resultado", FieldKind::Decimal, &["valorTotalResultado"]),
    FieldMapping::new("situacao_item", FieldKind::Text, &["situacaoCompraItemNome"]),
    FieldMapping::new("criterio_julgamento", FieldKind::Text, &["criterioJulgamentoNome"]),
    FieldMapping::new("tem_resultado", FieldKind::Bool, &["temResultado"]),
    FieldMapping::new("cod_fornecedor", FieldKind::Text, &["codFornecedor"]),
    FieldMapping::new("nome_fornecedor", FieldKind::Text, &["nomeFornecedor"]),
    FieldMapping::new("data_inclusao_pncp", FieldKind::Timestamp, &["dataInclusaoPncp"]),
    FieldMapping::new("data_atualizacao_pncp", FieldKind::Timestamp, &["dataAtualizacaoPncp"]),
];

pub const ENTITY: EntitySpec = EntitySpec {
    name: "contratacao_itens",
    table: "contratacao_item_pncp_14133",
    natural_key: &["id_compra", "numero_item"],
    fields: FIELDS,
};

/// Known purchase ids, those with no items stored first, then the least
/// recently refreshed. Bind: limit.
const PURCHASE_IDS_SQL: &str = r#"
SELECT c.id_compra
FROM contratacao_pncp_14133 c
LEFT JOIN etl_target_fetch f
  ON f.query = 'contratacao_itens_purchase_ids'
 AND f.target_key = c.id_compra
WHERE c.id_compra IS NOT NULL
  AND c.id_compra <> ''
ORDER BY f.fetched_at ASC NULLS FIRST,
         c.data_publicacao_pncp ASC NULLS LAST
LIMIT $1::bigint
"#;

pub fn purchase_ids(limit: u32) -> TargetQuery {
    TargetQuery {
        name: "contratacao_itens_purchase_ids",
        sql: PURCHASE_IDS_SQL,
        binds: vec![limit.to_string()],
        params: &[("id_compra", ID_PARAM)],
        context: &[("id_compra", ID_CONTEXT)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compras_core::{FieldValue, MappingContext};
    use serde_json::json;

    #[test]
    fn purchase_id_comes_from_target() {
        let context = MappingContext::from([(ID_CONTEXT.to_string(), "15512505000122025".to_string())]);
        let item = json!({"numeroItemCompra": 3, "descricaoResumida": "Toner", "quantidade": 12});
        let mapped = ENTITY.map_record(&item, &context).unwrap();
        assert_eq!(
            mapped.natural_key(),
            Some(vec!["15512505000122025".to_string(), "3".to_string()])
        );
        assert_eq!(mapped.field("quantidade"), Some(&FieldValue::Decimal(Some(12.0))));
    }

    #[test]
    fn targets_are_keyed_by_purchase_id() {
        let query = purchase_ids(50);
        assert_eq!(query.params, &[("id_compra", "codigo")]);
        assert_eq!(query.binds, vec!["50".to_string()]);
        // the stamp is looked up under this query's own name
        assert!(query.sql.contains(&format!("f.query = '{}'", query.name)));
        assert!(query.sql.contains("ORDER BY f.fetched_at ASC NULLS FIRST"));
    }
}
