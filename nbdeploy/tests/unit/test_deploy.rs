//! Deployment orchestrator integration tests against a scripted kernel

mod common;

use std::sync::Arc;

use common::{FakeKernel, RecordingSurface, Scripted, UNMARSHAL};
use nbdeploy::app::run::resume_exploration;
use nbdeploy::deploy::fsm::AttemptPhase;
use nbdeploy::deploy::orchestrator::{Options, OVERWRITE_TITLE};
use nbdeploy::deploy::registry::{AttemptSequence, DeployAttemptRegistry};
use nbdeploy::deploy::{DeployRequest, Orchestrator};
use nbdeploy::errors::BridgeError;
use nbdeploy::models::deployment::{DeployAttempt, DeploymentType};
use nbdeploy::models::pipeline::NotebookMetadata;
use nbdeploy::models::task::TaskStatus;
use nbdeploy::rpc::RpcClient;
use serde_json::{json, Value};

struct Harness {
    kernel: Arc<FakeKernel>,
    surface: Arc<RecordingSurface>,
    orchestrator: Orchestrator,
}

impl Harness {
    fn new(confirm: bool) -> Self {
        let kernel = Arc::new(FakeKernel::new());
        let surface = Arc::new(RecordingSurface::answering(confirm));
        let orchestrator = Orchestrator::new(
            Options::default(),
            Arc::new(RpcClient::new(kernel.clone())),
            surface.clone(),
            Arc::new(DeployAttemptRegistry::new()),
            Arc::new(AttemptSequence::new()),
        );
        Self {
            kernel,
            surface,
            orchestrator,
        }
    }

    fn attempt(&self, index: u64) -> DeployAttempt {
        self.orchestrator.registry().get(index).unwrap()
    }
}

fn metadata(volumes: Value) -> NotebookMetadata {
    serde_json::from_value(json!({
        "experiment": {"id": "e1", "name": "Default"},
        "experiment_name": "Default",
        "pipeline_name": "train",
        "docker_image": "gcr.io/notebook:1",
        "volumes": volumes,
    }))
    .unwrap()
}

fn request(deployment_type: DeploymentType, metadata: NotebookMetadata) -> DeployRequest {
    DeployRequest {
        deployment_type,
        source_notebook_path: "train.ipynb".to_string(),
        metadata,
        debug: false,
    }
}

fn compiled() -> Value {
    json!({
        "pipeline_package_path": "/home/jovyan/train.pipeline.tar.gz",
        "pipeline_metadata": {"pipeline_name": "train", "experiment_name": "Default"},
    })
}

fn saved_line() -> String {
    "Pipeline saved successfully at /home/jovyan/train.pipeline.tar.gz".to_string()
}

#[tokio::test]
async fn test_compile_only_makes_one_call() {
    let harness = Harness::new(true);
    harness.kernel.returns("nb.compile_notebook", compiled());

    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Compile, metadata(json!([]))))
        .await;

    assert_eq!(report.index, 1);
    assert!(report.succeeded());
    assert_eq!(harness.kernel.call_names(), vec!["nb.compile_notebook"]);
    assert_eq!(
        harness.surface.messages(),
        vec![("Operation Successful".to_string(), vec![saved_line()])]
    );

    let kwargs = &harness.kernel.calls()[0].1;
    assert_eq!(kwargs["source_notebook_path"], "train.ipynb");
    assert_eq!(kwargs["debug"], false);
    assert_eq!(kwargs["notebook_metadata_overrides"]["pipeline_name"], "train");

    let attempt = harness.attempt(1);
    assert!(!attempt.in_progress);
    assert!(!attempt.show_upload_progress);
    assert_eq!(attempt.phase, AttemptPhase::Completed);
}

#[tokio::test]
async fn test_empty_compile_result_fails_once() {
    let harness = Harness::new(true);
    harness.kernel.returns("nb.compile_notebook", Value::Null);

    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Run, metadata(json!([]))))
        .await;

    assert_eq!(report.phase, AttemptPhase::Failed);
    assert_eq!(harness.kernel.call_names(), vec!["nb.compile_notebook"]);
    assert_eq!(
        harness.surface.messages(),
        vec![(
            "Operation Failed".to_string(),
            vec!["Could not compile pipeline.".to_string()]
        )]
    );
    assert!(!harness.attempt(1).in_progress);
}

#[tokio::test]
async fn test_compile_rpc_error_is_reported() {
    let harness = Harness::new(true);
    harness.kernel.on(
        "nb.compile_notebook",
        Scripted::RpcError {
            code: 4,
            message: "step has no name".to_string(),
        },
    );

    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Upload, metadata(json!([]))))
        .await;

    assert_eq!(report.phase, AttemptPhase::Failed);
    assert_eq!(harness.kernel.count("kfp.upload_pipeline"), 0);

    let messages = harness.surface.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "An RPC Error has occurred");
    assert!(messages[0].1.contains(&"Code: 4 (InternalError)".to_string()));
    assert!(messages[0].1.contains(&"Message: step has no name".to_string()));
    assert!(!harness.attempt(1).in_progress);
}

#[tokio::test]
async fn test_declined_overwrite_stops_upload() {
    let harness = Harness::new(false);
    harness.kernel.returns("nb.compile_notebook", compiled());
    harness
        .kernel
        .returns("kfp.upload_pipeline", json!({"already_exists": true, "pipeline": null}));

    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Run, metadata(json!([]))))
        .await;

    assert_eq!(report.phase, AttemptPhase::Failed);
    assert_eq!(
        harness.kernel.call_names(),
        vec!["nb.compile_notebook", "kfp.upload_pipeline"]
    );
    assert_eq!(harness.kernel.calls()[1].1["overwrite"], false);
    assert_eq!(
        harness.surface.confirms(),
        vec![(
            OVERWRITE_TITLE.to_string(),
            "Pipeline with name train already exists. Would you like to overwrite it?".to_string()
        )]
    );
    assert_eq!(
        harness.surface.messages(),
        vec![(
            "Operation Failed".to_string(),
            vec![saved_line(), "Could not upload pipeline.".to_string()]
        )]
    );

    let attempt = harness.attempt(1);
    assert!(attempt.pipeline_declined());
    assert!(attempt.show_upload_progress);
    assert!(!attempt.show_run_progress);
    assert!(!attempt.in_progress);
}

#[tokio::test]
async fn test_accepted_overwrite_uploads_again() {
    let harness = Harness::new(true);
    harness.kernel.returns("nb.compile_notebook", compiled());
    harness
        .kernel
        .returns("kfp.upload_pipeline", json!({"already_exists": true}))
        .returns(
            "kfp.upload_pipeline",
            json!({"already_exists": false, "pipeline": {"id": "p1", "name": "train"}}),
        );

    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Upload, metadata(json!([]))))
        .await;

    assert!(report.succeeded());
    let uploads: Vec<Value> = harness
        .kernel
        .calls()
        .into_iter()
        .filter(|(name, _)| name == "kfp.upload_pipeline")
        .map(|(_, kwargs)| kwargs["overwrite"].clone())
        .collect();
    assert_eq!(uploads, vec![json!(false), json!(true)]);
    assert_eq!(
        harness.surface.messages(),
        vec![(
            "Operation Successful".to_string(),
            vec![
                saved_line(),
                "Pipeline with name train uploaded successfully.".to_string()
            ]
        )]
    );
    assert_eq!(
        harness.attempt(1).pipeline,
        Some(json!({"already_exists": false, "pipeline": {"id": "p1", "name": "train"}}))
    );
}

#[tokio::test]
async fn test_concurrent_attempts_keep_their_records() {
    let harness = Harness::new(true);
    harness.kernel.returns("nb.compile_notebook", compiled());
    harness
        .kernel
        .returns("kfp.upload_pipeline", json!({"pipeline": {"id": "p1", "name": "train"}}));

    let (first, second) = tokio::join!(
        harness
            .orchestrator
            .deploy(request(DeploymentType::Compile, metadata(json!([])))),
        harness
            .orchestrator
            .deploy(request(DeploymentType::Upload, metadata(json!([])))),
    );

    assert_eq!((first.index, second.index), (1, 2));
    assert!(first.succeeded() && second.succeeded());
    assert_eq!(harness.kernel.max_in_flight(), 1);

    let compile_only = harness.attempt(1);
    assert!(!compile_only.show_upload_progress);
    assert!(compile_only.pipeline.is_none());

    let upload = harness.attempt(2);
    assert!(upload.show_upload_progress);
    assert!(upload.pipeline.is_some());
    assert_eq!(harness.orchestrator.registry().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_snapshot_aborts_silently() {
    let harness = Harness::new(true);
    harness
        .kernel
        .returns("rok.snapshot_notebook", json!({"task": {"id": "t1"}}))
        .returns("rok.get_task", json!({"id": "t1", "status": "running", "progress": 0.3}))
        .returns("rok.get_task", json!({"id": "t1", "status": "error", "progress": 0.3}));

    let volumes = json!([{"type": "clone", "name": "workspace", "mount_point": "/home/jovyan"}]);
    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Run, metadata(volumes)))
        .await;

    assert_eq!(report.phase, AttemptPhase::Aborted);
    assert_eq!(
        harness.kernel.call_names(),
        vec!["rok.snapshot_notebook", "rok.get_task", "rok.get_task"]
    );
    assert!(harness.surface.messages().is_empty());

    let attempt = harness.attempt(1);
    assert!(attempt.show_snapshot_progress);
    assert_eq!(attempt.task.unwrap().status, TaskStatus::Error);
    assert!(!attempt.in_progress);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_replaces_cloned_volumes() {
    let harness = Harness::new(true);
    harness
        .kernel
        .returns("rok.snapshot_notebook", json!({"task": {"id": "t1"}}))
        .returns(
            "rok.get_task",
            json!({"id": "t1", "status": "success", "progress": 1.0, "bucket": "notebooks",
                   "result": {"event": {"object": "nb-obj", "version": "v3"}}}),
        )
        .returns(
            "rok.replace_cloned_volumes",
            json!([{"type": "new_pvc", "name": "workspace", "mount_point": "/home/jovyan",
                    "annotations": [{"key": "rok/origin", "value": "rok:notebooks/nb-obj/v3"}]}]),
        )
        .returns("nb.compile_notebook", compiled());

    let volumes = json!([{"type": "clone", "name": "workspace", "mount_point": "/home/jovyan"}]);
    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Compile, metadata(volumes)))
        .await;

    assert!(report.succeeded());
    let calls = harness.kernel.calls();
    assert_eq!(calls[2].0, "rok.replace_cloned_volumes");
    assert_eq!(calls[2].1["bucket"], "notebooks");
    assert_eq!(calls[2].1["obj"], "nb-obj");
    assert_eq!(calls[2].1["version"], "v3");
    assert_eq!(calls[2].1["volumes"][0]["type"], "clone");

    assert_eq!(calls[3].0, "nb.compile_notebook");
    let overrides = &calls[3].1["notebook_metadata_overrides"];
    assert_eq!(overrides["volumes"][0]["type"], "new_pvc");
    assert_eq!(overrides["volumes"].as_array().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_is_watched_until_it_stops_running() {
    let harness = Harness::new(true);
    harness
        .kernel
        .returns("nb.compile_notebook", compiled())
        .returns("kfp.upload_pipeline", json!({"pipeline": {"id": "p1", "name": "train"}}))
        .returns("kfp.run_pipeline", json!({"id": "run1", "status": null}))
        .returns("kfp.get_run", json!({"id": "run1", "status": null}))
        .returns("kfp.get_run", json!({"id": "run1", "status": "Running"}))
        .returns("kfp.get_run", json!({"id": "run1", "status": "Succeeded"}));

    let mut report = harness
        .orchestrator
        .deploy(request(DeploymentType::Run, metadata(json!([]))))
        .await;

    assert!(report.succeeded());
    assert_eq!(
        harness.surface.messages(),
        vec![(
            "Operation Successful".to_string(),
            vec![
                saved_line(),
                "Pipeline with name train uploaded successfully.".to_string(),
                "Pipeline run created successfully".to_string(),
            ]
        )]
    );
    assert!(!harness.attempt(1).in_progress);
    assert!(harness.attempt(1).show_run_progress);

    let watch = report.run_watch.take().unwrap();
    assert_eq!(watch.run_id(), "run1");
    let last = watch.join().await.unwrap();

    assert_eq!(last["status"], "Succeeded");
    assert_eq!(harness.kernel.count("kfp.get_run"), 3);
    assert_eq!(
        harness.attempt(1).run_pipeline,
        Some(json!({"id": "run1", "status": "Succeeded"}))
    );
}

#[tokio::test(start_paused = true)]
async fn test_canceled_watch_stops_rescheduling() {
    let harness = Harness::new(true);
    harness
        .kernel
        .returns("nb.compile_notebook", compiled())
        .returns("kfp.upload_pipeline", json!({"pipeline": {"id": "p1", "name": "train"}}))
        .returns("kfp.run_pipeline", json!({"id": "run1", "status": "Running"}))
        .returns("kfp.get_run", json!({"id": "run1", "status": "Running"}));

    let mut report = harness
        .orchestrator
        .deploy(request(DeploymentType::Run, metadata(json!([]))))
        .await;

    let watch = report.run_watch.take().unwrap();
    watch.cancel();
    let last = watch.join().await.unwrap();

    assert_eq!(last["status"], "Running");
    assert_eq!(harness.kernel.count("kfp.get_run"), 1);
}

#[tokio::test]
async fn test_empty_run_result_fails() {
    let harness = Harness::new(true);
    harness
        .kernel
        .returns("nb.compile_notebook", compiled())
        .returns("kfp.upload_pipeline", json!({"pipeline": {"id": "p1", "name": "train"}}))
        .returns("kfp.run_pipeline", Value::Null);

    let report = harness
        .orchestrator
        .deploy(request(DeploymentType::Run, metadata(json!([]))))
        .await;

    assert_eq!(report.phase, AttemptPhase::Failed);
    assert!(report.run_watch.is_none());
    assert_eq!(harness.kernel.count("kfp.get_run"), 0);
    assert_eq!(
        harness.surface.messages(),
        vec![(
            "Operation Failed".to_string(),
            vec![
                saved_line(),
                "Pipeline with name train uploaded successfully.".to_string(),
                "Could not create run.".to_string(),
            ]
        )]
    );
}

#[tokio::test]
async fn test_exploration_restores_data_before_cleanup() {
    let h = Harness::new(true);
    h.kernel
        .returns("nb.explore_notebook", json!({"is_exploration": true, "step_name": "train"}))
        .returns("nb.remove_marshal_dir", Value::Null);
    let client = RpcClient::new(h.kernel.clone());

    resume_exploration(&client, h.surface.as_ref(), "pipeline.ipynb")
        .await
        .unwrap();

    assert_eq!(
        h.kernel.call_names(),
        vec!["nb.explore_notebook", UNMARSHAL, "nb.remove_marshal_dir"]
    );
    assert_eq!(h.kernel.calls()[1].1, json!("pipeline.ipynb"));
    assert_eq!(
        h.kernel.calls()[2].1,
        json!({"source_notebook_path": "pipeline.ipynb"})
    );
    assert_eq!(
        h.surface.messages(),
        vec![(
            "Notebook Exploration".to_string(),
            vec!["Resuming notebook at step: \"train\"".to_string()]
        )]
    );
}

#[tokio::test]
async fn test_regular_notebook_keeps_marshal_dir() {
    let h = Harness::new(true);
    h.kernel
        .returns("nb.explore_notebook", json!({"is_exploration": false, "step_name": ""}));
    let client = RpcClient::new(h.kernel.clone());

    resume_exploration(&client, h.surface.as_ref(), "pipeline.ipynb")
        .await
        .unwrap();

    assert_eq!(h.kernel.call_names(), vec!["nb.explore_notebook"]);
    assert!(h.surface.messages().is_empty());
}

#[tokio::test]
async fn test_failed_unmarshal_keeps_marshal_dir() {
    let h = Harness::new(true);
    h.kernel
        .returns("nb.explore_notebook", json!({"is_exploration": true, "step_name": "train"}))
        .on(
            UNMARSHAL,
            Scripted::Raise {
                ename: "FileNotFoundError".to_string(),
                evalue: "no marshal dir".to_string(),
            },
        );
    let client = RpcClient::new(h.kernel.clone());

    let err = resume_exploration(&client, h.surface.as_ref(), "pipeline.ipynb")
        .await
        .unwrap_err();

    match err {
        BridgeError::Kernel(e) => assert_eq!(e.rpc, "nb.unmarshal_data"),
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(h.kernel.call_names(), vec!["nb.explore_notebook", UNMARSHAL]);
    assert!(h.surface.messages().is_empty());
}
