//! Purchases published to PNCP under Lei 14.133.

use compras_core::{EntitySpec, FieldKind, FieldMapping};

use crate::{DateParams, EntityEndpoint};

pub const ENDPOINT: EntityEndpoint = EntityEndpoint {
    name: "modulo-contratacoes/1_consultarContratacoes_PNCP_14133",
    paths: &["/modulo-contratacoes/1_consultarContratacoes_PNCP_14133"],
};

pub const DATES: DateParams = DateParams {
    from: "dataPublicacaoPncpInicial",
    to: "dataPublicacaoPncpFinal",
};

pub const UNIT_PARAM: &str = "unidadeOrgaoCodigoUnidade";
pub const MODALITY_PARAM: &str = "codigoModalidade";

const FIELDS: &[FieldMapping] = &[
    FieldMapping::new(
        "numero_controle_pncp",
        FieldKind::Text,
        &[
            "numeroControlePNCP",
            "numeroControlePncp",
            "numeroControlePncpCompra",
            "numeroControlePncpContratacao",
        ],
    ),
    FieldMapping::new("id_compra", FieldKind::Text, &["idCompra"]),
    FieldMapping::new("codigo_modalidade", FieldKind::Integer, &["codigoModalidade"])
        .or_context(MODALITY_PARAM),
    FieldMapping::new("modalidade_nome", FieldKind::Text, &["modalidadeNome"]),
    FieldMapping::new("unidade_orgao_codigo_unidade", FieldKind::Text, &["unidadeOrgaoCodigoUnidade"])
        .or_context(UNIT_PARAM),
    FieldMapping::new("unidade_orgao_nome_unidade", FieldKind::Text, &["unidadeOrgaoNomeUnidade"]),
    FieldMapping::new("unidade_orgao_uf_sigla", FieldKind::Text, &["unidadeOrgaoUfSigla"]),
    FieldMapping::new("unidade_orgao_municipio_nome", FieldKind::Text, &["unidadeOrgaoMunicipioNome"]),
    FieldMapping::new("unidade_orgao_codigo_ibge", FieldKind::Integer, &["unidadeOrgaoCodigoIbge"]),
    FieldMapping::new("orgao_entidade_cnpj", FieldKind::Text, &["orgaoEntidadeCnpj"]),
    FieldMapping::new("orgao_entidade_razao_social", FieldKind::Text, &["orgaoEntidadeRazaoSocial"]),
    FieldMapping::new("codigo_orgao", FieldKind::Integer, &["codigoOrgao"]),
    FieldMapping::new("numero_compra", FieldKind::Text, &["numeroCompra"]),
    FieldMapping::new("ano_compra_pncp", FieldKind::Integer, &["anoCompraPncp"]),
    FieldMapping::new("sequencial_compra_pncp", FieldKind::Integer, &["sequencialCompraPncp"]),
    FieldMapping::new("processo", FieldKind::Text, &["processo"]),
    FieldMapping::new("srp", FieldKind::Bool, &["srp"]),
    FieldMapping::new("objeto_compra", FieldKind::Text, &["objetoCompra", "objeto"]),
    FieldMapping::new("amparo_legal_nome", FieldKind::Text, &["amparoLegalNome"]),
    FieldMapping::new("modo_disputa_nome", FieldKind::Text, &["modoDisputaNomePncp"]),
    FieldMapping::new("situacao_compra_nome", FieldKind::Text, &["situacaoCompraNomePncp"]),
    FieldMapping::new("data_publicacao_pncp", FieldKind::Date, &["dataPublicacaoPncp"]),
    FieldMapping::new("data_abertura_proposta", FieldKind::Timestamp, &["dataAberturaPropostaPncp"]),
    FieldMapping::new("data_encerramento_proposta", FieldKind::Timestamp, &["dataEncerramentoPropostaPncp"]),
    FieldMapping::new("data_inclusao_pncp", FieldKind::Timestamp, &["dataInclusaoPncp"]),
    FieldMapping::new(
        "data_atualizacao_pncp",
        FieldKind::Timestamp,
        &["dataAtualizacaoPncp", "dataAtualizacaoGlobalPncp"],
    ),
    FieldMapping::new("valor_total_estimado", FieldKind::Decimal, &["valorTotalEstimado"]),
    FieldMapping::new("valor_total_homologado", FieldKind::Decimal, &["valorTotalHomologado"]),
    FieldMapping::new("contratacao_excluida", FieldKind::Bool, &["contratacaoExcluida"]),
];

pub const ENTITY: EntitySpec = EntitySpec {
    name: "contratacoes",
    table: "contratacao_pncp_14133",
    natural_key: &["numero_controle_pncp"],
    fields: FIELDS,
};
