//! Full reconcile cycles against recording backends.
//!
//! Each test builds a cluster picture, runs one or more cycles and checks
//! what was sent to the cluster, the workers, the alert stream and the
//! discovery store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use taskgrid_executor::assign::Supply;
use taskgrid_executor::*;
use taskgrid_state::*;

const NOW: u64 = 1_700_000_000_000;

#[derive(Default)]
struct Recorder {
    jobs: Mutex<Vec<JobSpec>>,
    commands: Mutex<Vec<WorkerCommand>>,
    added: Mutex<Vec<UnscheduledEntry>>,
    removed: Mutex<Vec<RemovedEvent>>,
    snapshots: Mutex<Vec<DiscoverySnapshot>>,
    fail_algorithm: Option<String>,
}

impl Recorder {
    fn failing_for(algorithm: &str) -> Self {
        Self {
            fail_algorithm: Some(algorithm.to_string()),
            ..Default::default()
        }
    }

    fn jobs(&self) -> Vec<JobSpec> {
        self.jobs.lock().unwrap().clone()
    }

    fn commands(&self, kind: CommandKind) -> Vec<WorkerCommand> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command == kind)
            .cloned()
            .collect()
    }

    fn last_snapshot(&self) -> Option<DiscoverySnapshot> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl ClusterClient for Recorder {
    fn create_job<'a>(&'a self, spec: &'a JobSpec) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.jobs.lock().unwrap().push(spec.clone());
            if self.fail_algorithm.as_deref() == Some(spec.algorithm_name.as_str()) {
                anyhow::bail!("cluster rejected {}", spec.name);
            }
            Ok(())
        })
    }
}

impl WorkerChannel for Recorder {
    fn send_command<'a>(&'a self, command: &'a WorkerCommand) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.commands.lock().unwrap().push(command.clone());
            Ok(())
        })
    }
}

impl EventStore for Recorder {
    fn add_event<'a>(&'a self, entry: &'a UnscheduledEntry) -> BoxFuture<'a, anyhow::Result<String>> {
        Box::pin(async move {
            let mut added = self.added.lock().unwrap();
            added.push(entry.clone());
            Ok(format!("event-{}", added.len()))
        })
    }

    fn remove_event<'a>(&'a self, event: &'a RemovedEvent) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.removed.lock().unwrap().push(event.clone());
            Ok(())
        })
    }
}

impl DiscoveryPublisher for Recorder {
    fn update_discovery<'a>(
        &'a self,
        snapshot: &'a DiscoverySnapshot,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.snapshots.lock().unwrap().push(snapshot.clone());
            Ok(())
        })
    }
}

fn reconciler(recorder: &Arc<Recorder>) -> Reconciler {
    let backends = Backends {
        cluster: recorder.clone(),
        workers: recorder.clone(),
        events: recorder.clone(),
        discovery: recorder.clone(),
    };
    Reconciler::new(ExecutorConfig::default(), backends)
}

fn template(name: &str) -> AlgorithmTemplate {
    let mut t = AlgorithmTemplate::new(name, &format!("{name}-alg"));
    t.resources = ResourceSpec::new(1.0, 0.0, "256Mi");
    t
}

fn node(name: &str, cpu: f64, used_cpu: f64) -> NodeResources {
    NodeResources {
        name: name.to_string(),
        total: Resources::new(cpu, 0.0, 16_384.0),
        requests: Resources::new(used_cpu, 0.0, 0.0),
        ..Default::default()
    }
}

struct Scene {
    input: CycleInput,
}

impl Scene {
    fn new(algorithms: &[&str]) -> Self {
        let mut input = CycleInput::default();
        for a in algorithms {
            input.templates.insert(a.to_string(), template(a));
        }
        input.resources = ClusterResources::new(vec![node("n1", 64.0, 0.0)]);
        Self { input }
    }

    fn requests(mut self, algorithm: &str, n: usize) -> Self {
        self.input
            .requests
            .extend((0..n).map(|_| AlgorithmRequest::new(algorithm)));
        self
    }

    fn nodes(mut self, nodes: Vec<NodeResources>) -> Self {
        self.input.resources = ClusterResources::new(nodes);
        self
    }

    /// A worker with a running job that started `age_ms` ago.
    fn worker(mut self, id: &str, algorithm: &str, status: WorkerStatus, paused: bool, age_ms: u64) -> Self {
        let pod = format!("pod-{id}");
        let job = format!("job-{id}");
        self.input.workers.push(WorkerRecord {
            worker_id: id.to_string(),
            algorithm_name: algorithm.to_string(),
            pod_name: pod.clone(),
            worker_status: status,
            worker_paused: paused,
            hot_worker: false,
            algorithm_image: None,
            worker_image: None,
        });
        self.input.jobs.push(JobRecord {
            name: job.clone(),
            algorithm_name: algorithm.to_string(),
            start_time: NOW - age_ms,
            succeeded: false,
            failed: false,
        });
        self.input.pods.push(PodRecord {
            name: pod,
            job_name: job,
            node_name: Some("n1".to_string()),
        });
        self
    }

    fn idle(self, id: &str, algorithm: &str) -> Self {
        self.worker(id, algorithm, WorkerStatus::Ready, false, 60_000)
    }
}

#[tokio::test]
async fn fair_share_admits_capacity_worth_of_requests() {
    let mut scene = Scene::new(&["x"]).requests("x", 30);
    for i in 0..10 {
        scene = scene.worker(&format!("busy-{i}"), "x", WorkerStatus::Working, false, 60_000);
    }
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let plan = rec.plan(&scene.input, NOW);
    assert!((plan.capacity - 10.0).abs() < 1e-9);
    assert_eq!(plan.admitted.len(), 10);
    assert_eq!(plan.result["x"].required, 10);
    assert_eq!(plan.result["x"].active, 10);
}

#[tokio::test]
async fn idle_workers_absorb_requests() {
    let mut scene = Scene::new(&["x"]).requests("x", 3);
    for i in 0..5 {
        scene = scene.idle(&format!("idle-{i}"), "x");
    }
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let plan = rec.plan(&scene.input, NOW);
    assert_eq!(plan.scheduled.len(), 3);
    assert!(plan.scheduled.iter().all(|s| s.supply == Supply::Idle));
    assert!(plan.created.is_empty());
    assert!(plan.outbound.is_empty());
    assert_eq!(plan.result["x"].required, 0);
    assert_eq!(plan.result["x"].idle, 5);
}

#[tokio::test]
async fn starved_algorithm_reclaims_idle_worker() {
    let scene = Scene::new(&["y", "z"])
        .requests("y", 3)
        .idle("old-z", "z")
        .nodes(vec![node("n1", 2.0, 0.0)]);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let result = rec.reconcile_at(&scene.input, NOW).await;

    assert_eq!(recorder.jobs().len(), 2);
    let y = result["y"];
    assert_eq!((y.required, y.created, y.skipped), (3, 2, 1));

    let stops = recorder.commands(CommandKind::StopProcessing);
    assert_eq!(stops.len(), 1);
    assert_eq!(stops[0].worker_id, "old-z");
    assert_eq!(stops[0].pod_name.as_deref(), Some("pod-old-z"));
    assert_eq!(result["z"].paused, 1);

    let snapshot = recorder.last_snapshot().unwrap();
    assert_eq!(snapshot.resources_to_free, Resources::new(1.0, 0.0, 256.0));
    assert_eq!(snapshot.reconcile_result, result);
}

#[tokio::test]
async fn young_workers_are_not_reclaimed() {
    let scene = Scene::new(&["y", "z"])
        .requests("y", 3)
        .worker("fresh-z", "z", WorkerStatus::Ready, false, 5_000)
        .nodes(vec![node("n1", 2.0, 0.0)]);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    rec.reconcile_at(&scene.input, NOW).await;
    assert!(recorder.commands(CommandKind::StopProcessing).is_empty());
}

#[tokio::test]
async fn resume_cancels_stop_of_same_algorithm() {
    let scene = Scene::new(&["x", "y"])
        .requests("x", 2)
        .requests("y", 1)
        .idle("idle-x", "x")
        .worker("paused-x", "x", WorkerStatus::Ready, true, 60_000)
        .worker("busy-x", "x", WorkerStatus::Working, false, 60_000)
        .nodes(vec![node("n1", 1.0, 1.0)]);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let result = rec.reconcile_at(&scene.input, NOW).await;

    assert_eq!(result["y"].skipped, 1);
    assert!(recorder.commands(CommandKind::StopProcessing).is_empty());
    assert!(recorder.commands(CommandKind::StartProcessing).is_empty());
    assert_eq!(result["x"].resumed, 0);
    assert_eq!(result["x"].paused, 0);
}

#[tokio::test]
async fn paused_worker_is_resumed() {
    let scene = Scene::new(&["x"])
        .requests("x", 1)
        .worker("paused-x", "x", WorkerStatus::Ready, true, 60_000);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let result = rec.reconcile_at(&scene.input, NOW).await;
    let resumed = recorder.commands(CommandKind::StartProcessing);
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].worker_id, "paused-x");
    assert_eq!(result["x"].resumed, 1);
    assert!(recorder.jobs().is_empty());
}

#[tokio::test]
async fn no_worker_gets_two_outcomes() {
    let mut scene = Scene::new(&["a", "b", "c"])
        .requests("a", 4)
        .requests("b", 4)
        .requests("c", 2)
        .worker("pa", "a", WorkerStatus::Ready, true, 60_000)
        .worker("pb", "b", WorkerStatus::Ready, true, 60_000)
        .nodes(vec![node("n1", 3.0, 0.0)]);
    for i in 0..4 {
        scene = scene
            .idle(&format!("ia{i}"), "a")
            .worker(&format!("wc{i}"), "c", WorkerStatus::Working, false, 60_000);
    }
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let plan = rec.plan(&scene.input, NOW);
    let mut seen = HashSet::new();
    let ids = plan
        .scheduled
        .iter()
        .map(|s| s.worker_id.as_str())
        .chain(plan.stops.iter().map(|s| s.worker.id.as_str()));
    for id in ids {
        assert!(seen.insert(id), "worker {id} used twice");
    }
}

#[tokio::test]
async fn unscheduled_alert_is_raised_and_cleared() {
    let mut scene = Scene::new(&["gpu"]).requests("gpu", 1);
    if let Some(t) = scene.input.templates.get_mut("gpu") {
        t.node_selector
            .insert("accelerator".to_string(), "a100".to_string());
    }
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    // No node carries the label: can never fit, alert right away.
    rec.reconcile_at(&scene.input, NOW).await;
    let added = recorder.added.lock().unwrap().clone();
    assert_eq!(added.len(), 1);
    assert!(added[0].has_max_capacity);
    assert_eq!(
        rec.tracker().get("gpu").and_then(|e| e.event_id.as_deref()),
        Some("event-1")
    );
    let snapshot = recorder.last_snapshot().unwrap();
    assert_eq!(snapshot.unscheduled.added[0].event_id.as_deref(), Some("event-1"));

    // Still stuck: nothing new.
    rec.reconcile_at(&scene.input, NOW + 1_000).await;
    assert_eq!(recorder.added.lock().unwrap().len(), 1);

    // A labelled node appears and the job is created.
    let mut labelled = node("gpu-1", 8.0, 0.0);
    labelled
        .labels
        .insert("accelerator".to_string(), "a100".to_string());
    scene.input.resources = ClusterResources::new(vec![labelled]);
    rec.reconcile_at(&scene.input, NOW + 2_000).await;

    let removed = recorder.removed.lock().unwrap().clone();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].event_id, "event-1");
    assert!(rec.tracker().is_empty());
}

#[tokio::test]
async fn slow_skip_alerts_after_timeout() {
    let scene = Scene::new(&["y"])
        .requests("y", 1)
        .nodes(vec![node("n1", 2.0, 2.0)]);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    rec.reconcile_at(&scene.input, NOW).await;
    assert!(recorder.added.lock().unwrap().is_empty());
    assert!(!rec.tracker().get("y").unwrap().is_notified);

    rec.reconcile_at(&scene.input, NOW + 20_001).await;
    assert_eq!(recorder.added.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_template_counts_as_skipped() {
    let scene = Scene::new(&[]).requests("ghost", 2);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let result = rec.reconcile_at(&scene.input, NOW).await;
    assert_eq!(result["ghost"].skipped, 2);
    assert!(recorder.jobs().is_empty());
    assert!(rec.tracker().is_empty());
}

#[tokio::test]
async fn failed_dispatch_does_not_block_siblings() {
    let scene = Scene::new(&["bad", "good"])
        .requests("bad", 1)
        .requests("good", 1)
        .worker("paused-good", "good", WorkerStatus::Ready, true, 60_000)
        .requests("good", 1);
    let recorder = Arc::new(Recorder::failing_for("bad"));
    let mut rec = reconciler(&recorder);

    let result = rec.reconcile_at(&scene.input, NOW).await;

    let names: Vec<_> = recorder.jobs().into_iter().map(|j| j.algorithm_name).collect();
    assert_eq!(names, vec!["bad".to_string(), "good".to_string()]);
    assert_eq!(recorder.commands(CommandKind::StartProcessing).len(), 1);
    assert_eq!(result["bad"].created, 1);
    assert!(recorder.last_snapshot().is_some());
}

#[tokio::test]
async fn ledger_bridges_until_ttl() {
    let scene = Scene::new(&["x"]).requests("x", 1);
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    rec.reconcile_at(&scene.input, NOW).await;
    assert_eq!(recorder.jobs().len(), 1);
    assert_eq!(rec.ledger().len(), 1);

    // Job not visible yet: the ledger entry stands in for it.
    rec.reconcile_at(&scene.input, NOW + 1_000).await;
    assert_eq!(recorder.jobs().len(), 1);

    // Past the TTL the entry is gone and a new job is submitted.
    rec.reconcile_at(&scene.input, NOW + 16_000).await;
    assert_eq!(recorder.jobs().len(), 2);
}

#[tokio::test]
async fn stale_image_worker_exits_and_is_not_reused() {
    let mut scene = Scene::new(&["x"]).requests("x", 1).idle("old", "x");
    scene.input.workers[0].algorithm_image = Some("x-alg:previous".to_string());
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    rec.reconcile_at(&scene.input, NOW).await;
    let exits = recorder.commands(CommandKind::Exit);
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].worker_id, "old");
    assert_eq!(exits[0].message.as_deref(), Some("algorithm image changed"));
    assert_eq!(recorder.jobs().len(), 1);
}

#[tokio::test]
async fn hot_workers_are_warmed_and_kept() {
    let mut scene = Scene::new(&["x"]).idle("w1", "x");
    if let Some(t) = scene.input.templates.get_mut("x") {
        t.min_hot_workers = 1;
    }
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let plan = rec.plan(&scene.input, NOW);
    assert_eq!(plan.warm_up.len(), 1);
    assert_eq!(plan.admitted.len(), 1);
    assert!(plan.admitted[0].hot_worker);
    assert_eq!(plan.scheduled[0].worker_id, "w1");
    assert!(plan.created.is_empty());
}

#[tokio::test]
async fn capacity_stays_clamped_across_cycles() {
    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);
    let empty = CycleInput::default();

    for i in 0..50 {
        rec.reconcile_at(&empty, NOW + i * 1_000).await;
        assert!(rec.capacity() >= 2.0 && rec.capacity() <= 50.0);
    }
    assert!((rec.capacity() - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn worker_with_unknown_status_does_not_block_the_cycle() {
    let mut scene = Scene::new(&["x"])
        .idle("w1", "x")
        .worker("busy-1", "x", WorkerStatus::Working, false, 60_000)
        .requests("x", 2);
    let busy: WorkerRecord = serde_json::from_value(serde_json::json!({
        "worker_id": "busy-1",
        "algorithm_name": "x",
        "pod_name": "pod-busy-1",
        "worker_status": "busy",
    }))
    .unwrap();
    scene.input.workers.retain(|w| w.worker_id != "busy-1");
    scene.input.workers.push(busy);

    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);

    let plan = rec.plan(&scene.input, NOW);
    assert_eq!(plan.scheduled.len(), 1);
    assert_eq!(plan.scheduled[0].worker_id, "w1");
    assert_eq!(plan.created.len(), 1);

    let recorder = Arc::new(Recorder::default());
    let mut rec = reconciler(&recorder);
    let result = rec.reconcile_at(&scene.input, NOW).await;
    assert_eq!(result["x"].idle, 1);
    assert_eq!(recorder.jobs().len(), 1);

    let snapshot = recorder.last_snapshot().unwrap();
    let x = snapshot
        .actual
        .stats
        .iter()
        .find(|s| s.algorithm_name == "x")
        .unwrap();
    assert_eq!(x.by_status.get("busy"), Some(&1));
    assert_eq!(x.by_status.get("ready"), Some(&1));
}
