#![forbid(unsafe_code)]

mod support;

use std::sync::Arc;

use serde_json::json;

use k9rs_core::{Config, Gvr, ALL_NAMESPACES};
use k9rs_dao::{accessor_for, ListOptions, SYNTHETICS};
use k9rs_kubehub::{ContextInfo, DeleteOptions, Factory, ForwardSession, ScanReport};
use support::{namespaced, object, FakeFactory};

fn kind_for(f: &Arc<dyn Factory>, id: &str) -> &'static str {
    accessor_for(f.clone(), &Gvr::new(id)).expect("dispatch").kind()
}

#[test]
fn dispatch_table_and_fallback() {
    let f = FakeFactory::offline().into_arc();
    assert_eq!(kind_for(&f, "v1/pods"), "Pod");
    assert_eq!(kind_for(&f, "v1/nodes"), "Node");
    assert_eq!(kind_for(&f, "v1/secrets"), "Secret");
    assert_eq!(kind_for(&f, "v1/services"), "Generic");
    assert_eq!(kind_for(&f, "apps/v1/deployments"), "Scaler");
    assert_eq!(kind_for(&f, "apps/v1/daemonsets"), "Generic");
    assert_eq!(kind_for(&f, "batch/v1beta1/cronjobs"), "Generic");
    assert_eq!(kind_for(&f, "helm"), "HelmChart");
    assert_eq!(kind_for(&f, "helm-history"), "HelmHistory");
    assert_eq!(kind_for(&f, "contexts"), "Context");
    assert_eq!(kind_for(&f, "scans"), "ImageScan");
    assert_eq!(kind_for(&f, "apiextensions.k8s.io/v1/customresourcedefinitions"), "Generic");

    let id = Gvr::new("example.com/v1/widgets");
    let a = accessor_for(f.clone(), &id).expect("fallback");
    assert_eq!(a.kind(), "Scaler");
    assert_eq!(a.gvr(), &id);
    assert!(a.scalable().is_some());
    assert!(a.nuker().is_some());
}

#[test]
fn every_synthetic_accessor_is_bound_to_its_identifier() {
    let f = FakeFactory::offline().into_arc();
    for s in SYNTHETICS.iter().filter(|s| s.accessor.is_some()) {
        let a = accessor_for(f.clone(), &s.gvr()).expect("dispatch");
        assert_eq!(a.gvr(), &s.gvr());
        assert_ne!(a.kind(), "Scaler", "{}", s.id);
    }
}

#[tokio::test]
async fn fallback_accessor_lists_deletes_and_scales() {
    let fake = Arc::new(FakeFactory::offline().with_objects(
        "example.com/v1/widgets",
        vec![
            namespaced("example.com/v1", "Widget", "default", "a", &[]),
            namespaced("example.com/v1", "Widget", "other", "b", &[]),
        ],
    ));
    let f: Arc<dyn Factory> = fake.clone();
    let a = accessor_for(f, &Gvr::new("example.com/v1/widgets")).expect("fallback");

    let items = a.list(&ListOptions::namespace("default")).await.expect("list");
    assert_eq!(items.len(), 1);
    let got = a.get(&ListOptions::all(), "other/b").await.expect("get");
    assert_eq!(got.metadata.name.as_deref(), Some("b"));

    a.scalable().expect("scalable").scale("default/a", 3).await.expect("scale");
    a.nuker().expect("nuker").delete("default/a", &DeleteOptions::default()).await.expect("delete");
    assert_eq!(fake.scaled(), vec![(Gvr::new("example.com/v1/widgets"), "default/a".to_string(), 3)]);
    assert_eq!(fake.deleted(), vec![(Gvr::new("example.com/v1/widgets"), "default/a".to_string())]);
}

#[tokio::test]
async fn nodes_cannot_be_deleted() {
    let f = FakeFactory::offline()
        .with_objects("v1/nodes", vec![object(json!({"apiVersion": "v1", "kind": "Node", "metadata": {"name": "n1"}}))])
        .into_arc();
    let a = accessor_for(f, &Gvr::new("v1/nodes")).expect("dispatch");
    assert!(a.nuker().is_none());
    assert!(a.scalable().is_none());
    assert_eq!(a.list(&ListOptions::namespace("default")).await.expect("list").len(), 1);
}

#[tokio::test]
async fn secrets_are_redacted() {
    let mut s = namespaced("v1", "Secret", "default", "creds", &[]);
    s.data = json!({"data": {"password": "aHVudGVyMg=="}, "type": "Opaque"});
    let f = FakeFactory::offline().with_objects("v1/secrets", vec![s]).into_arc();
    let a = accessor_for(f, &Gvr::new("v1/secrets")).expect("dispatch");
    let items = a.list(&ListOptions::all()).await.expect("list");
    assert_eq!(items[0].data["data"]["password"], json!("***"));
}

#[tokio::test]
async fn workloads_skip_failing_kinds() {
    let f = FakeFactory::offline()
        .with_objects("apps/v1/deployments", vec![namespaced("apps/v1", "Deployment", "default", "web", &[])])
        .with_objects("batch/v1/jobs", vec![namespaced("batch/v1", "Job", "default", "migrate", &[])])
        .with_objects("apps/v1/statefulsets", vec![namespaced("apps/v1", "StatefulSet", "other", "db", &[])])
        .failing_list("apps/v1/daemonsets")
        .into_arc();
    let a = accessor_for(f, &Gvr::new("workloads")).expect("dispatch");
    let mut names: Vec<String> = a
        .list(&ListOptions::namespace("default"))
        .await
        .expect("list")
        .into_iter()
        .filter_map(|o| o.metadata.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["migrate", "web"]);
}

#[tokio::test]
async fn containers_come_from_the_parent_pod() {
    let mut pod = namespaced("v1", "Pod", "default", "web-0", &[]);
    pod.data = json!({
        "spec": {
            "initContainers": [{"name": "init", "image": "busybox"}],
            "containers": [{"name": "app", "image": "nginx:1.25"}, {"name": "sidecar", "image": "envoy"}]
        },
        "status": {"containerStatuses": [{"name": "app", "ready": true, "restartCount": 2}]}
    });
    let f = FakeFactory::offline().with_objects("v1/pods", vec![pod]).into_arc();
    let a = accessor_for(f, &Gvr::new("containers")).expect("dispatch");

    assert!(a.list(&ListOptions::all()).await.is_err(), "parent path required");
    let rows = a.list(&ListOptions::all().with_path("default/web-0")).await.expect("list");
    let names: Vec<_> = rows.iter().filter_map(|r| r.metadata.name.clone()).collect();
    assert_eq!(names, vec!["init", "app", "sidecar"]);
    assert_eq!(rows[0].data["init"], json!(true));
    assert_eq!(rows[1].data["ready"], json!(true));
    assert_eq!(rows[1].data["restartCount"], json!(2));
    assert_eq!(rows[2].data["ready"], json!(false));
    assert_eq!(rows[1].types.as_ref().map(|t| t.kind.as_str()), Some("Container"));
}

#[tokio::test]
async fn contexts_flag_the_current_one() {
    let f = FakeFactory::offline()
        .with_contexts(vec![
            ContextInfo { name: "dev".into(), namespace: Some("apps".into()), current: true },
            ContextInfo { name: "prod".into(), namespace: None, current: false },
        ])
        .into_arc();
    let rows = accessor_for(f, &Gvr::new("contexts")).expect("dispatch").list(&ListOptions::all()).await.expect("list");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].data["current"], json!(true));
    assert_eq!(rows[1].data["namespace"], json!(null));

    let offline = FakeFactory::offline().into_arc();
    assert!(accessor_for(offline, &Gvr::new("contexts")).expect("dispatch").list(&ListOptions::all()).await.is_err());
}

#[tokio::test]
async fn screendumps_list_and_delete_files() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("pods-1.csv"), "a,b").expect("write");
    std::fs::write(tmp.path().join("pods-2.csv"), "c,d").expect("write");
    let cfg = Config { screen_dump_dir: tmp.path().to_path_buf(), ..Config::default() };
    let f = FakeFactory::offline().with_config(cfg).into_arc();

    let a = accessor_for(f, &Gvr::new("screendumps")).expect("dispatch");
    let rows = a.list(&ListOptions::all()).await.expect("list");
    let names: Vec<_> = rows.iter().filter_map(|r| r.metadata.name.clone()).collect();
    assert_eq!(names, vec!["pods-1.csv", "pods-2.csv"]);
    assert_eq!(rows[0].data["size"], json!(3));

    a.nuker().expect("nuker").delete("pods-1.csv", &DeleteOptions::default()).await.expect("delete");
    assert!(!tmp.path().join("pods-1.csv").exists());
    assert!(a.nuker().expect("nuker").delete("..", &DeleteOptions::default()).await.is_err());
}

#[tokio::test]
async fn file_deletes_stay_inside_their_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let dumps = tmp.path().join("dumps");
    std::fs::create_dir(&dumps).expect("mkdir");
    std::fs::write(dumps.join("keep.csv"), "a").expect("write");
    let victim = tmp.path().join("victim.txt");
    std::fs::write(&victim, "x").expect("write");
    let outside = tempfile::tempdir().expect("tempdir");
    let absolute = outside.path().join("outside.txt");
    std::fs::write(&absolute, "x").expect("write");

    let cfg = Config { screen_dump_dir: dumps.clone(), benchmark_dir: dumps.clone(), ..Config::default() };
    let f = FakeFactory::offline().with_config(cfg).into_arc();
    for gvr in ["screendumps", "benchmarks"] {
        let a = accessor_for(f.clone(), &Gvr::new(gvr)).expect("dispatch");
        let nuker = a.nuker().expect("nuker");
        for path in [
            "x/../victim.txt".to_string(),
            "../victim.txt".to_string(),
            format!("x/{}", absolute.display()),
            "x/sub/keep.csv".to_string(),
            "".to_string(),
        ] {
            assert!(nuker.delete(&path, &DeleteOptions::default()).await.is_err(), "{gvr}: {path}");
        }
    }
    assert!(victim.exists());
    assert!(absolute.exists());
    assert!(dumps.join("keep.csv").exists());
}

#[tokio::test]
async fn missing_benchmark_dir_lists_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let cfg = Config { benchmark_dir: tmp.path().join("absent"), ..Config::default() };
    let f = FakeFactory::offline().with_config(cfg).into_arc();
    let rows = accessor_for(f, &Gvr::new("benchmarks")).expect("dispatch").list(&ListOptions::all()).await.expect("list");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn dir_requires_an_existing_directory() {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::create_dir(tmp.path().join("sub")).expect("mkdir");
    std::fs::write(tmp.path().join("notes.txt"), "x").expect("write");
    let f = FakeFactory::offline().into_arc();
    let a = accessor_for(f, &Gvr::new("dir")).expect("dispatch");

    let path = tmp.path().display().to_string();
    let rows = a.list(&ListOptions::all().with_path(&path)).await.expect("list");
    assert_eq!(rows.len(), 2);
    let sub = rows.iter().find(|r| r.metadata.name.as_deref() == Some("sub")).expect("sub");
    assert_eq!(sub.data["dir"], json!(true));

    let missing = tmp.path().join("nope").display().to_string();
    assert!(a.list(&ListOptions::all().with_path(&missing)).await.is_err());
}

#[tokio::test]
async fn port_forwards_list_by_namespace_and_stop() {
    let web = ForwardSession { path: "default/web-0".into(), container: "app".into(), local_port: 8080, remote_port: 80 };
    let db = ForwardSession { path: "data/db-0".into(), container: "pg".into(), local_port: 5432, remote_port: 5432 };
    let fake = Arc::new(FakeFactory::offline().with_forwards(vec![web.clone(), db.clone()]));
    let f: Arc<dyn Factory> = fake.clone();
    let a = accessor_for(f, &Gvr::new("portforwards")).expect("dispatch");

    assert_eq!(a.list(&ListOptions::namespace(ALL_NAMESPACES)).await.expect("list").len(), 2);
    let rows = a.list(&ListOptions::namespace("data")).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metadata.name.as_deref(), Some("db-0"));
    assert_eq!(rows[0].data["localPort"], json!(5432));

    a.nuker().expect("nuker").delete("default/web-0", &DeleteOptions::default()).await.expect("stop");
    assert_eq!(fake.port_forwards(), vec![db.clone()]);
    a.nuker().expect("nuker").delete(&db.key(), &DeleteOptions::default()).await.expect("stop by key");
    assert!(fake.port_forwards().is_empty());
    assert!(a.nuker().expect("nuker").delete("default/web-0", &DeleteOptions::default()).await.is_err());
}

#[tokio::test]
async fn scans_become_rows() {
    let f = FakeFactory::offline()
        .with_scans(vec![ScanReport { image: "nginx:1.25".into(), critical: 1, high: 4, ..Default::default() }])
        .into_arc();
    let rows = accessor_for(f, &Gvr::new("scans")).expect("dispatch").list(&ListOptions::all()).await.expect("list");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metadata.name.as_deref(), Some("nginx:1.25"));
    assert_eq!(rows[0].data["high"], json!(4));
}

fn helm_secret(ns: &str, release: &str, rev: u32, status: &str) -> kube::core::DynamicObject {
    let rev_s = rev.to_string();
    namespaced(
        "v1",
        "Secret",
        ns,
        &format!("sh.helm.release.v1.{release}.v{rev}"),
        &[("owner", "helm"), ("name", release), ("version", rev_s.as_str()), ("status", status)],
    )
}

fn helm_cluster() -> Arc<FakeFactory> {
    Arc::new(FakeFactory::offline().with_objects(
        "v1/secrets",
        vec![
            helm_secret("apps", "web", 1, "superseded"),
            helm_secret("apps", "web", 2, "deployed"),
            helm_secret("apps", "api", 1, "deployed"),
            helm_secret("infra", "web", 5, "failed"),
            namespaced("v1", "Secret", "apps", "db-creds", &[]),
        ],
    ))
}

#[tokio::test]
async fn helm_charts_show_latest_revisions() {
    let fake = helm_cluster();
    let f: Arc<dyn Factory> = fake.clone();
    let a = accessor_for(f, &Gvr::new("helm")).expect("dispatch");

    let rows = a.list(&ListOptions::namespace("apps")).await.expect("list");
    let got: Vec<_> = rows
        .iter()
        .map(|r| (r.metadata.name.clone().unwrap_or_default(), r.data["revision"].as_u64().unwrap_or_default()))
        .collect();
    assert_eq!(got, vec![("api".to_string(), 1), ("web".to_string(), 2)]);
    assert_eq!(a.list(&ListOptions::all()).await.expect("list").len(), 3);

    a.nuker().expect("nuker").delete("apps/web", &DeleteOptions::default()).await.expect("uninstall");
    let mut deleted: Vec<_> = fake.deleted().into_iter().map(|(_, p)| p).collect();
    deleted.sort();
    assert_eq!(deleted, vec!["apps/sh.helm.release.v1.web.v1", "apps/sh.helm.release.v1.web.v2"]);
    assert!(a.nuker().expect("nuker").delete("web", &DeleteOptions::default()).await.is_err());
}

#[tokio::test]
async fn helm_history_is_newest_first() {
    let fake = helm_cluster();
    let f: Arc<dyn Factory> = fake.clone();
    let a = accessor_for(f, &Gvr::new("helm-history")).expect("dispatch");

    let rows = a.list(&ListOptions::all().with_path("apps/web")).await.expect("list");
    let names: Vec<_> = rows.iter().filter_map(|r| r.metadata.name.clone()).collect();
    assert_eq!(names, vec!["web.v2", "web.v1"]);
    assert_eq!(rows[1].data["status"], json!("superseded"));

    a.nuker().expect("nuker").delete("apps/web.v1", &DeleteOptions::default()).await.expect("delete revision");
    assert_eq!(fake.deleted(), vec![(Gvr::new("v1/secrets"), "apps/sh.helm.release.v1.web.v1".to_string())]);
    assert!(a.nuker().expect("nuker").delete("apps/web.v9", &DeleteOptions::default()).await.is_err());
    assert!(a.nuker().expect("nuker").delete("apps/web", &DeleteOptions::default()).await.is_err());
}

#[tokio::test]
async fn helm_history_deletes_the_recorded_secret() {
    let fake = Arc::new(FakeFactory::offline().with_objects(
        "v1/secrets",
        vec![namespaced(
            "v1",
            "Secret",
            "apps",
            "web-release-backup",
            &[("owner", "helm"), ("name", "web"), ("version", "4"), ("status", "deployed")],
        )],
    ));
    let f: Arc<dyn Factory> = fake.clone();
    let a = accessor_for(f, &Gvr::new("helm-history")).expect("dispatch");

    let rows = a.list(&ListOptions::all().with_path("apps/web")).await.expect("list");
    assert_eq!(rows[0].metadata.name.as_deref(), Some("web.v4"));
    assert_eq!(rows[0].data["secret"], json!("web-release-backup"));

    a.nuker().expect("nuker").delete("apps/web.v4", &DeleteOptions::default()).await.expect("delete revision");
    assert_eq!(fake.deleted(), vec![(Gvr::new("v1/secrets"), "apps/web-release-backup".to_string())]);
}
