//! Image resolution and job-spec construction for new workers.

use taskgrid_state::{AlgorithmRequest, AlgorithmTemplate, JobSpec};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult};

/// Repository of the worker image when a template does not override it.
pub const DEFAULT_WORKER_IMAGE: &str = "taskgrid/worker";

/// Prefix `image` with `registry` unless it already names a registry host.
///
/// The first path segment is a host if it contains `.` or `:`, or is
/// `localhost`.
pub fn resolve_image(image: &str, registry: Option<&str>) -> String {
    let Some(registry) = registry.filter(|r| !r.is_empty()) else {
        return image.to_string();
    };
    let has_host = image
        .split_once('/')
        .is_some_and(|(first, _)| first.contains('.') || first.contains(':') || first == "localhost");
    if has_host {
        image.to_string()
    } else {
        format!("{}/{}", registry.trim_end_matches('/'), image)
    }
}

/// Resolves the images a worker of a given template should run.
#[derive(Debug, Clone, Copy)]
pub struct ImageResolver<'a> {
    registry: Option<&'a str>,
    worker_tag: &'a str,
}

impl<'a> ImageResolver<'a> {
    pub fn new(config: &'a ExecutorConfig) -> Self {
        Self {
            registry: config.registry.as_deref(),
            worker_tag: &config.versions.worker,
        }
    }

    pub fn algorithm_image(&self, template: &AlgorithmTemplate) -> String {
        resolve_image(&template.algorithm_image, self.registry)
    }

    pub fn worker_image(&self, template: &AlgorithmTemplate) -> String {
        match &template.worker_image {
            Some(image) => resolve_image(image, self.registry),
            None => resolve_image(
                &format!("{DEFAULT_WORKER_IMAGE}:{}", self.worker_tag),
                self.registry,
            ),
        }
    }
}

/// Builds job specs with unique names.
#[derive(Debug, Default)]
pub struct JobSpecFactory {
    next_seq: u64,
}

impl JobSpecFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the spec for one new worker serving `request`.
    pub fn build(
        &mut self,
        template: &AlgorithmTemplate,
        request: &AlgorithmRequest,
        config: &ExecutorConfig,
        now_ms: u64,
    ) -> ExecutorResult<JobSpec> {
        let template_error = |source| ExecutorError::Template {
            algorithm: template.name.clone(),
            source,
        };
        let algorithm_resources = template.resources(&config.defaults).map_err(template_error)?;
        let worker_resources = config
            .worker_resources
            .resolve(&config.worker_resources)
            .map_err(template_error)?;

        let images = ImageResolver::new(config);
        let seq = self.next_seq;
        self.next_seq += 1;

        Ok(JobSpec {
            name: format!("{}-{:x}-{}", template.name, now_ms, seq),
            algorithm_name: template.name.clone(),
            algorithm_image: images.algorithm_image(template),
            worker_image: images.worker_image(template),
            algorithm_env: template.algorithm_env.clone(),
            worker_env: template.worker_env.clone(),
            entry_point: template.entry_point.clone(),
            node_selector: template.node_selector.clone(),
            mounts: template.mounts.clone(),
            algorithm_resources,
            worker_resources,
            hot_worker: request.hot_worker,
            debug: template.options.debug,
            cluster: config.cluster.clone(),
        })
    }
}
