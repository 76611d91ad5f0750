mod support;

use nodekeeper_core::config::{marker_path, symlink_path, upgrade_binary_path};
use nodekeeper_core::diagnose::Diagnostician;
use nodekeeper_core::error::{ErrorClass, KeeperError};
use nodekeeper_core::release::{Release, ReleaseAsset};
use nodekeeper_core::repair::{Liveness, RepairExecutor, RepairStep, plan_steps};
use nodekeeper_core::testing::{FakeChainRpc, FakeDownloader, FakeReleaseSource, FakeRuntime};
use nodekeeper_core::topology::Subsystem;

use support::{NodeTree, sha256_hex, zip_with};

const STUCK_LOGS: [&str; 2] = [
    "ERR panic: binary missing for v0.2.8 upgrade plan",
    "ERR UPGRADE \"v0.2.10\" NEEDED at height 812000: binary missing for v0.2.10",
];

struct Artifacts {
    release: Release,
    downloader: FakeDownloader,
}

fn artifacts(tamper: bool) -> Artifacts {
    let mut assets = Vec::new();
    let mut downloader = FakeDownloader::default();
    for subsystem in Subsystem::ALL {
        let name = subsystem.asset_name("amd64");
        let body = zip_with(&[(subsystem.binary_name(), subsystem.binary_name().as_bytes())]);
        let url = format!("https://downloads.test/release/v0.2.10/{}", name);
        let mut digest = sha256_hex(&body);
        if tamper {
            digest = digest.chars().rev().collect();
        }
        assets.push(ReleaseAsset {
            name,
            download_url: url.clone(),
            sha256: Some(digest),
            size: body.len() as u64,
        });
        downloader = downloader.serving(&url, body);
    }
    Artifacts {
        release: Release {
            tag: "release/v0.2.10".to_string(),
            assets,
        },
        downloader,
    }
}

fn stuck_tree() -> NodeTree {
    let tree = NodeTree::new();
    tree.write_marker(r#"{"name":"v0.2.10","height":812000}"#);
    #[cfg(unix)]
    for subsystem in Subsystem::ALL {
        tree.point_current_at(subsystem, "upgrades/v0.2.10");
    }
    tree
}

#[tokio::test]
async fn stuck_node_is_repaired_end_to_end() {
    let tree = stuck_tree();
    let runtime = FakeRuntime::default().with_logs(STUCK_LOGS);
    let chain = FakeChainRpc::default().at_height(812_001);
    let Artifacts {
        release,
        downloader,
    } = artifacts(false);
    let releases = FakeReleaseSource::default().with_tag(release);

    let plan = Diagnostician::new(&tree.config, &runtime, Some(&chain))
        .run()
        .await;
    assert_eq!(plan.upgrade_name.as_deref(), Some("v0.2.10"));
    assert!(plan.needs_binary);

    let steps = plan_steps(&plan);
    assert_eq!(steps.first(), Some(&RepairStep::StopServices));
    assert_eq!(steps.last(), Some(&RepairStep::AwaitLiveness));

    let report = RepairExecutor::new(&tree.config, &runtime, &chain, &releases, &downloader)
        .execute(&plan)
        .await
        .expect("repair should succeed");

    assert!(report.log.degraded().next().is_none());
    assert!(report.log.warnings.is_empty(), "warnings: {:?}", report.log.warnings);
    assert_eq!(report.installed.len(), 2);
    for subsystem in Subsystem::ALL {
        let binary = upgrade_binary_path(&tree.config.paths, subsystem, "v0.2.10");
        assert_eq!(
            std::fs::read(&binary).expect("installed binary"),
            subsystem.binary_name().as_bytes()
        );
        #[cfg(unix)]
        {
            assert!(support::is_executable(&binary));
            assert!(symlink_path(&tree.config.paths, subsystem).exists());
        }
    }
    assert!(!marker_path(&tree.config.paths).exists());
    assert_eq!(
        report.liveness,
        Some(Liveness::Responding {
            height: 812_001,
            catching_up: false
        })
    );

    let calls = runtime.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        ["stop node", "stop api", "start node,api"]
    );

    // a second diagnosis of the repaired tree finds nothing
    let quiet = FakeRuntime::default();
    let replan = Diagnostician::new(&tree.config, &quiet, None).run().await;
    assert!(replan.is_empty(), "leftover findings: {:?}", replan.diagnoses);
}

#[tokio::test]
async fn digest_mismatch_aborts_before_services_restart() {
    let tree = stuck_tree();
    let runtime = FakeRuntime::default().with_logs(STUCK_LOGS);
    let chain = FakeChainRpc::default();
    let Artifacts {
        release,
        downloader,
    } = artifacts(true);
    let releases = FakeReleaseSource::default().with_tag(release);

    let plan = Diagnostician::new(&tree.config, &runtime, Some(&chain))
        .run()
        .await;
    let err = RepairExecutor::new(&tree.config, &runtime, &chain, &releases, &downloader)
        .execute(&plan)
        .await
        .expect_err("tampered artifacts must abort the repair");

    assert_eq!(KeeperError::classify(&err), ErrorClass::Verification);
    assert!(format!("{:#}", err).contains("install binaries"));
    assert!(!runtime.calls().iter().any(|c| c.starts_with("start")));
    assert!(
        !upgrade_binary_path(&tree.config.paths, Subsystem::Node, "v0.2.10").exists()
    );
    // the marker step comes after install and never ran
    assert!(marker_path(&tree.config.paths).exists());
}

#[tokio::test]
async fn healthy_node_needs_no_steps() {
    let tree = NodeTree::new();
    let runtime = FakeRuntime::default();
    let chain = FakeChainRpc::default();
    let releases = FakeReleaseSource::default();
    let downloader = FakeDownloader::default();

    let plan = Diagnostician::new(&tree.config, &runtime, Some(&chain))
        .run()
        .await;
    assert!(plan_steps(&plan).is_empty());

    let report = RepairExecutor::new(&tree.config, &runtime, &chain, &releases, &downloader)
        .execute(&plan)
        .await
        .expect("empty repair succeeds");
    assert!(report.log.steps.is_empty());
    assert_eq!(runtime.calls(), vec!["logs node"]);
}
