//! Price-registration acts (atas de registro de preço).

use compras_core::{EntitySpec, FieldKind, FieldMapping};

use crate::{DateParams, EntityEndpoint};

pub const ENDPOINT: EntityEndpoint = EntityEndpoint {
    name: "modulo-arp/1_consultarARP",
    paths: &[
        "/modulo-arp/1_consultarARP",
        "/modulo-arp/1_consultarARP/",
        "/modulo_arp/1_consultarARP",
    ],
};

/// Acts are windowed by the start of their validity period.
pub const DATES: DateParams = DateParams {
    from: "dataVigenciaInicialMin",
    to: "dataVigenciaInicialMax",
};

pub const UNIT_PARAM: &str = "codigoUnidadeGerenciadora";

const FIELDS: &[FieldMapping] = &[
    FieldMapping::new("codigo_unidade_gerenciadora", FieldKind::Integer, &["codigoUnidadeGerenciadora"])
        .or_context(UNIT_PARAM),
    FieldMapping::new("numero_ata_registro_preco", FieldKind::Text, &["numeroAtaRegistroPreco"]),
    FieldMapping::new("numero_controle_pncp_ata", FieldKind::Text, &["numeroControlePncpAta"]),
    FieldMapping::new("ano_ata", FieldKind::Integer, &["anoAta"]),
    FieldMapping::new("nome_unidade_gerenciadora", FieldKind::Text, &["nomeUnidadeGerenciadora"]),
    FieldMapping::new("numero_compra", FieldKind::Text, &["numeroCompra"]),
    FieldMapping::new("ano_compra", FieldKind::Integer, &["anoCompra"]),
    FieldMapping::new("codigo_modalidade_compra", FieldKind::Integer, &["codigoModalidadeCompra"]),
    FieldMapping::new("nome_modalidade_compra", FieldKind::Text, &["nomeModalidadeCompra"]),
    FieldMapping::new("id_compra", FieldKind::Text, &["idCompra"]),
    FieldMapping::new("numero_controle_pncp_compra", FieldKind::Text, &["numeroControlePncpCompra"]),
    FieldMapping::new("objeto", FieldKind::Text, &["objeto", "objetoCompra"]),
    FieldMapping::new("status_ata", FieldKind::Text, &["statusAta", "situacao"]),
    FieldMapping::new("data_assinatura", FieldKind::Date, &["dataAssinatura"]),
    FieldMapping::new("data_vigencia_inicial", FieldKind::Date, &["dataVigenciaInicial"]),
    FieldMapping::new("data_vigencia_final", FieldKind::Date, &["dataVigenciaFinal"]),
    FieldMapping::new("valor_total", FieldKind::Decimal, &["valorTotal"]),
    FieldMapping::new("quantidade_itens", FieldKind::Integer, &["quantidadeItens"]),
    FieldMapping::new("data_hora_inclusao", FieldKind::Timestamp, &["dataHoraInclusao"]),
    FieldMapping::new("data_hora_atualizacao", FieldKind::Timestamp, &["dataHoraAtualizacao"]),
    FieldMapping::new("data_hora_exclusao", FieldKind::Timestamp, &["dataHoraExclusao"]),
    FieldMapping::new("ata_excluido", FieldKind::Bool, &["ataExcluido"]),
];

pub const ENTITY: EntitySpec = EntitySpec {
    name: "arp",
    table: "arp",
    natural_key: &["codigo_unidade_gerenciadora", "numero_ata_registro_preco"],
    fields: FIELDS,
};
