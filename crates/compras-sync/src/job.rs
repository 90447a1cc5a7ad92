//! Job definitions: one parameterized engine, configured per entity.

use compras_core::{DateWindow, EntitySpec, RequestParams};
use compras_entities::DateParams;
use compras_storage::{Endpoint, TargetQuery};

pub const PAGE_PARAM: &str = "pagina";
pub const PAGE_SIZE_PARAM: &str = "tamanhoPagina";

/// How a job walks the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPlan {
    /// Date windows, each fanned out over `partitions` and paged from 1.
    Windowed {
        dates: DateParams,
        partitions: Vec<RequestParams>,
    },
    /// One unpaged fetch per target selected from the store.
    Targeted { query: TargetQuery },
}

#[derive(Debug, Clone)]
pub struct IngestJob {
    pub name: String,
    pub endpoint: Endpoint,
    pub entity: &'static EntitySpec,
    /// Sent with every request of the job.
    pub params: RequestParams,
    pub plan: JobPlan,
    pub page_size: u32,
    /// Stop a window once `totalPaginas` is reached instead of fetching the
    /// trailing empty page.
    pub stop_on_declared_total: bool,
}

impl IngestJob {
    pub fn windowed(
        name: impl Into<String>,
        endpoint: Endpoint,
        entity: &'static EntitySpec,
        dates: DateParams,
    ) -> Self {
        Self::new(
            name.into(),
            endpoint,
            entity,
            JobPlan::Windowed {
                dates,
                partitions: Vec::new(),
            },
        )
    }

    pub fn targeted(
        name: impl Into<String>,
        endpoint: Endpoint,
        entity: &'static EntitySpec,
        query: TargetQuery,
    ) -> Self {
        Self::new(name.into(), endpoint, entity, JobPlan::Targeted { query })
    }

    fn new(name: String, endpoint: Endpoint, entity: &'static EntitySpec, plan: JobPlan) -> Self {
        Self {
            name,
            endpoint,
            entity,
            params: RequestParams::new(),
            plan,
            page_size: 500,
            stop_on_declared_total: false,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.set(key, value);
        self
    }

    /// Adds one partition per value of `key`. No-op for targeted jobs.
    pub fn partitioned_by<V: ToString>(mut self, key: &str, values: &[V]) -> Self {
        if let JobPlan::Windowed { partitions, .. } = &mut self.plan {
            partitions.extend(values.iter().map(|v| RequestParams::new().with(key, v.to_string())));
        }
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn stop_on_declared_total(mut self, enabled: bool) -> Self {
        self.stop_on_declared_total = enabled;
        self
    }

    pub fn is_targeted(&self) -> bool {
        matches!(self.plan, JobPlan::Targeted { .. })
    }

    /// Run-state key, e.g. `arp_last_run`.
    pub fn state_name(&self) -> String {
        format!("{}_last_run", self.name.replace('-', "_"))
    }

    /// Parameters of page 1 of `partition` within a date window. Paging
    /// parameters come first; later pages only change `pagina`.
    pub fn first_page_params(
        &self,
        dates: &DateParams,
        partition: &RequestParams,
        window: &DateWindow,
    ) -> RequestParams {
        let mut params = RequestParams::new()
            .with(PAGE_PARAM, 1)
            .with(PAGE_SIZE_PARAM, self.page_size);
        params.extend(&self.params);
        params.extend(partition);
        params.set(dates.from, window.start);
        params.set(dates.to, window.end);
        params
    }
}
