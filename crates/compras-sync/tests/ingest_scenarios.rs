use std::time::Duration;

use chrono::{NaiveDate, Utc};
use compras_core::{DateWindow, MappingContext, RequestParams};
use compras_storage::{IngestStore, MemoryStore, ResilientFetcher, Target};
use compras_sync::{execute, run_job, IngestJob, JobKind, RunMode, RunPlan, SyncConfig};
use serde_json::{json, Value as JsonValue};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARP_PATH: &str = "/modulo-arp/1_consultarARP";

fn config(server: &MockServer) -> SyncConfig {
    SyncConfig {
        base_urls: vec![server.uri()],
        pacing: Duration::ZERO,
        backoff_base_ms: 1,
        page_size: 2,
        ..SyncConfig::default()
    }
}

fn one_day() -> RunPlan {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    RunPlan {
        mode: RunMode::Full,
        range: Some(DateWindow { start: day, end: day }),
    }
}

fn arp_page(numbers: &[&str]) -> JsonValue {
    let records: Vec<_> = numbers
        .iter()
        .map(|n| {
            json!({
                "numeroAtaRegistroPreco": n,
                "numeroControlePncpAta": format!("00394445000166-1-{n}"),
                "valorTotal": 100.0,
            })
        })
        .collect();
    json!({"resultado": records, "totalRegistros": records.len(), "totalPaginas": 1})
}

async fn mount_arp_page(server: &MockServer, page: u32, body: JsonValue) {
    Mock::given(method("GET"))
        .and(path(ARP_PATH))
        .and(query_param("pagina", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn requests_for_page(server: &MockServer, page: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.query_pairs().any(|(k, v)| k == "pagina" && v == page))
        .count()
}

#[tokio::test]
async fn two_pages_archive_both_and_stop_at_the_empty_one() {
    let server = MockServer::start().await;
    mount_arp_page(&server, 1, arp_page(&["00001/2024", "00002/2024"])).await;
    mount_arp_page(&server, 2, arp_page(&[])).await;

    let config = config(&server);
    let store = MemoryStore::new();
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Arp.build(&config);

    let summary = execute(&config, &job, one_day(), &store, &fetcher).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(requests_for_page(&server, "3").await, 0);
    assert_eq!(store.raw_pages().await.len(), 2);
    assert_eq!(store.records("arp").await.len(), 2);
    assert_eq!(summary.totals.pages, 2);
    assert_eq!(summary.totals.upserts, 2);

    let stored = store.record("arp", &["155125", "00001/2024"]).await.unwrap();
    assert_eq!(stored.payload["numeroControlePncpAta"], "00394445000166-1-00001/2024");

    let raw = &store.raw_pages().await[0];
    assert_eq!(raw.endpoint, "modulo-arp/1_consultarARP");
    assert_eq!(raw.params.get("codigoUnidadeGerenciadora"), Some("155125"));
    assert_eq!(raw.params.get("dataVigenciaInicialMin"), Some("2024-03-01"));
    assert_eq!(raw.params.get("tamanhoPagina"), Some("2"));
}

#[tokio::test]
async fn rerun_is_idempotent_and_refreshes_last_seen() {
    let server = MockServer::start().await;
    mount_arp_page(&server, 1, arp_page(&["00001/2024", "00002/2024"])).await;
    mount_arp_page(&server, 2, arp_page(&[])).await;

    let config = config(&server);
    let store = MemoryStore::new();
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Arp.build(&config);

    execute(&config, &job, one_day(), &store, &fetcher).await.unwrap();
    let before = store.record("arp", &["155125", "00001/2024"]).await.unwrap();

    let second = execute(&config, &job, one_day(), &store, &fetcher).await.unwrap();
    let after = store.record("arp", &["155125", "00001/2024"]).await.unwrap();

    assert_eq!(store.raw_pages().await.len(), 2);
    assert_eq!(store.records("arp").await.len(), 2);
    assert_eq!(second.totals.raw_inserted, 0);
    assert_eq!(second.totals.raw_duplicates, 2);
    assert_eq!(second.totals.upserts, 2);
    assert_eq!(after.first_seen_at, before.first_seen_at);
    assert!(after.last_seen_at >= before.last_seen_at);
    assert_eq!(after.payload_sha256, before.payload_sha256);
}

#[tokio::test]
async fn transient_failures_are_retried_and_the_page_persisted_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARP_PATH))
        .and(query_param("pagina", "1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_arp_page(&server, 1, arp_page(&["00007/2024"])).await;
    mount_arp_page(&server, 2, arp_page(&[])).await;

    let config = config(&server);
    let store = MemoryStore::new();
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Arp.build(&config);

    let summary = execute(&config, &job, one_day(), &store, &fetcher).await.unwrap();

    assert_eq!(requests_for_page(&server, "1").await, 3);
    assert_eq!(summary.totals.raw_inserted, 2);
    assert_eq!(store.records("arp").await.len(), 1);
    assert_eq!(store.commit_count().await, 2);
}

#[tokio::test]
async fn client_error_fails_the_run_without_retry_or_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARP_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string("intervalo de datas maior que 365 dias"))
        .mount(&server)
        .await;

    let config = config(&server);
    let store = MemoryStore::new();
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Arp.build(&config);

    let err = execute(&config, &job, one_day(), &store, &fetcher).await.unwrap_err();
    let chain = format!("{err:#}");

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(chain.contains("job `arp`"), "{chain}");
    assert!(chain.contains("window 2024-03-01..2024-03-01"), "{chain}");
    assert!(chain.contains("page 1"), "{chain}");
    assert!(chain.contains("400"), "{chain}");
    assert!(store.get_state("arp_last_run").await.unwrap().is_none());
}

#[tokio::test]
async fn persistence_failure_rolls_back_the_page_and_aborts() {
    let server = MockServer::start().await;
    mount_arp_page(&server, 1, arp_page(&["00001/2024", "00002/2024"])).await;

    let config = config(&server);
    let store = MemoryStore::new();
    store.fail_merges_for("arp", &["155125", "00002/2024"]).await;
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Arp.build(&config);

    assert!(execute(&config, &job, one_day(), &store, &fetcher).await.is_err());
    assert!(store.raw_pages().await.is_empty());
    assert!(store.records("arp").await.is_empty());
    assert_eq!(requests_for_page(&server, "2").await, 0);
    assert!(store.get_state("arp_last_run").await.unwrap().is_none());
}

#[tokio::test]
async fn first_run_is_full_and_later_runs_are_daily() {
    let server = MockServer::start().await;
    mount_arp_page(&server, 1, arp_page(&[])).await;

    let today = Utc::now().date_naive();
    let config = SyncConfig {
        start_date: today,
        ..config(&server)
    };
    let store = MemoryStore::new();
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Arp.build(&config);

    let first = run_job(&config, &job, &store, &fetcher).await.unwrap();
    assert_eq!(first.mode, RunMode::Full);
    assert_eq!(first.start, Some(today));

    let second = run_job(&config, &job, &store, &fetcher).await.unwrap();
    assert_eq!(second.mode, RunMode::Daily);
    assert_eq!(second.start, today.checked_sub_days(chrono::Days::new(7)));
    assert_eq!(second.end, Some(today));

    let state = store.get_state("arp_last_run").await.unwrap().unwrap().value;
    assert_eq!(state["mode"], "daily");
    assert_eq!(state["run_id"], second.run_id.to_string());
    assert_eq!(state["pages"], 1);
    assert_eq!(state["raw_duplicates"], 1);
    for key in ["ended_at", "start", "end", "windows", "raw_inserted", "records_seen", "upserts", "skipped"] {
        assert!(state.get(key).is_some(), "missing {key} in {state}");
    }
}

#[tokio::test]
async fn modality_partitions_stop_at_declared_page_count() {
    let server = MockServer::start().await;
    let contratacoes_path = "/modulo-contratacoes/1_consultarContratacoes_PNCP_14133";
    Mock::given(method("GET"))
        .and(path(contratacoes_path))
        .and(query_param("codigoModalidade", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultado": [{"numeroControlePNCP": "00394445000166-1-000001/2024", "idCompra": "1"}],
            "totalPaginas": 1
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(contratacoes_path))
        .and(query_param("codigoModalidade", "6"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultado": [], "totalPaginas": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let config = SyncConfig {
        modalidades: vec![5, 6],
        ..config(&server)
    };
    let store = MemoryStore::new();
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job = JobKind::Contratacoes.build(&config);

    let summary = execute(&config, &job, one_day(), &store, &fetcher).await.unwrap();
    assert_eq!(summary.totals.pages, 2);

    let stored = store
        .record("contratacao_pncp_14133", &["00394445000166-1-000001/2024"])
        .await
        .unwrap();
    assert_eq!(
        stored.field("codigo_modalidade"),
        Some(&compras_core::FieldValue::Integer(Some(5)))
    );
}

#[tokio::test]
async fn item_job_fetches_each_target_once() {
    let server = MockServer::start().await;
    let items_path = "/modulo-contratacoes/2.1_consultarItensContratacoes_PNCP_14133_Id";
    Mock::given(method("GET"))
        .and(path(items_path))
        .and(query_param("tipo", "idCompra"))
        .and(query_param("codigo", "15512505000122025"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultado": [
                {"numeroItemCompra": 1, "descricaoResumida": "Papel"},
                {"numeroItemCompra": 2, "descricaoResumida": "Toner"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config(&server);
    let store = MemoryStore::new();
    store
        .set_targets(
            "contratacao_itens_purchase_ids",
            vec![Target {
                params: RequestParams::new().with("codigo", "15512505000122025"),
                context: MappingContext::from([("idCompra".to_string(), "15512505000122025".to_string())]),
            }],
        )
        .await;
    let fetcher = ResilientFetcher::new(config.http_client_config()).unwrap();
    let job: IngestJob = JobKind::ContratacaoItens.build(&config);

    let summary = run_job(&config, &job, &store, &fetcher).await.unwrap();

    assert_eq!(summary.mode, RunMode::Targets);
    assert_eq!(summary.totals.targets, 1);
    assert_eq!(summary.totals.upserts, 2);
    assert!(store
        .record("contratacao_item_pncp_14133", &["15512505000122025", "2"])
        .await
        .is_some());
    assert!(store
        .target_fetched_at("contratacao_itens_purchase_ids", "15512505000122025")
        .await
        .is_some());
    let state = store.get_state("contratacao_itens_last_run").await.unwrap().unwrap().value;
    assert_eq!(state["mode"], "targets");
    assert_eq!(state["start"], JsonValue::Null);
}
