//! Legacy tenders (modulo-legado), queried per UASG.

use compras_core::{EntitySpec, FieldKind, FieldMapping};

use crate::{DateParams, EntityEndpoint};

pub const ENDPOINT: EntityEndpoint = EntityEndpoint {
    name: "modulo-legado/1_consultarLicitacao",
    paths: &["/modulo-legado/1_consultarLicitacao"],
};

pub const DATES: DateParams = DateParams {
    from: "data_publicacao_inicial",
    to: "data_publicacao_final",
};

pub const UNIT_PARAM: &str = "uasg";

const FIELDS: &[FieldMapping] = &[
    FieldMapping::new("id_compra", FieldKind::Text, &["id_compra", "idCompra"]),
    FieldMapping::new("identificador", FieldKind::Text, &["identificador"]),
    FieldMapping::new("numero_processo", FieldKind::Text, &["numero_processo"]),
    FieldMapping::new("uasg", FieldKind::Integer, &["uasg"]).or_context(UNIT_PARAM),
    FieldMapping::new("modalidade", FieldKind::Integer, &["modalidade"]),
    FieldMapping::new("nome_modalidade", FieldKind::Text, &["nome_modalidade"]),
    FieldMapping::new("numero_aviso", FieldKind::Integer, &["numero_aviso"]),
    FieldMapping::new("situacao_aviso", FieldKind::Text, &["situacao_aviso"]),
    FieldMapping::new("tipo_pregao", FieldKind::Text, &["tipo_pregao"]),
    FieldMapping::new("tipo_recurso", FieldKind::Text, &["tipo_recurso"]),
    FieldMapping::new("nome_responsavel", FieldKind::Text, &["nome_responsavel"]),
    FieldMapping::new("funcao_responsavel", FieldKind::Text, &["funcao_responsavel"]),
    FieldMapping::new("numero_itens", FieldKind::Integer, &["numero_itens"]),
    FieldMapping::new("valor_estimado_total", FieldKind::Decimal, &["valor_estimado_total"]),
    FieldMapping::new("valor_homologado_total", FieldKind::Decimal, &["valor_homologado_total"]),
    FieldMapping::new("informacoes_gerais", FieldKind::Text, &["informacoes_gerais"]),
    FieldMapping::new("objeto", FieldKind::Text, &["objeto"]),
    FieldMapping::new("endereco_entrega_edital", FieldKind::Text, &["endereco_entrega_edital"]),
    FieldMapping::new("codigo_municipio_uasg", FieldKind::Integer, &["codigo_municipio_uasg"]),
    FieldMapping::new("data_abertura_proposta", FieldKind::Date, &["data_abertura_proposta"]),
    FieldMapping::new("data_entrega_edital", FieldKind::Date, &["data_entrega_edital"]),
    FieldMapping::new("data_entrega_proposta", FieldKind::Date, &["data_entrega_proposta"]),
    FieldMapping::new("data_publicacao", FieldKind::Date, &["data_publicacao"]),
    FieldMapping::new("dt_alteracao", FieldKind::Timestamp, &["dt_alteracao"]),
    FieldMapping::new("pertence_14133", FieldKind::Bool, &["pertence14133"]),
];

pub const ENTITY: EntitySpec = EntitySpec {
    name: "licitacao",
    table: "licitacao",
    natural_key: &["id_compra"],
    fields: FIELDS,
};
