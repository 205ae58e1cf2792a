//! End-to-end tests across building, scheduling and traversal.

#[cfg(test)]
mod tests {
    use crate::diagnostics::{
        exception_message, FailureChainBuilder, FailureChainConfig, EXCEPTION_NOT_FOUND,
    };
    use crate::errors::GraphError;
    use crate::graph::{BuildOptions, DescendantResolver, ExecutionBuilder};
    use crate::model::{Execution, ExecutionStatus, Stage, SyntheticStageOwner, Trigger};
    use crate::observability::init_test_tracing;
    use crate::persistence::{ExecutionRepository, InMemoryExecutionRepository};
    use crate::testing::{
        assert_contains_stage, assert_lacks_stage, assert_ordered_before, assert_stage_ids,
        assert_topologically_sound, dag_stage, failed_pipeline_stage, synthetic_stage,
        TestExecution,
    };
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::collections::HashSet;

    fn release_train() -> Execution {
        init_test_tracing();
        TestExecution::pipeline("train")
            .stages([
                dag_stage("bake", "1", &[]),
                dag_stage("test", "2", &["1"]),
                dag_stage("scan", "3", &["1"]),
                dag_stage("deploy-east", "4", &["2", "3"]),
                dag_stage("deploy-west", "5", &["2", "3"]),
                dag_stage("verify", "6", &["4", "5"]),
                dag_stage("docs", "7", &[]),
            ])
            .build()
    }

    #[test]
    fn test_sort_is_a_sound_permutation() {
        let execution = release_train();
        let sorted = execution.sorted_stages().unwrap();

        assert_eq!(sorted.len(), execution.stages().len());
        let unique: HashSet<&str> = sorted.iter().map(|s| s.id()).collect();
        assert_eq!(unique.len(), sorted.len());
        assert_topologically_sound(&sorted);
    }

    #[test]
    fn test_two_stage_scenario_then_self_reference() {
        let execution = TestExecution::pipeline("e")
            .stages([dag_stage("s1", "1", &[]), dag_stage("s2", "2", &["1"])])
            .build();
        assert_stage_ids(&execution.sorted_stages().unwrap(), &["s1", "s2"]);

        let execution = TestExecution::pipeline("e")
            .stages([
                dag_stage("s1", "1", &[]),
                dag_stage("s2", "2", &["1"]),
                dag_stage("s3", "3", &["2", "3"]),
            ])
            .build();
        let err = execution.sorted_stages().unwrap_err();
        assert!(err.is_structural());
        assert!(err.to_string().contains("[2, 3]->3"));
    }

    #[test]
    fn test_cycle_fails_without_dropping_stages() {
        let execution = TestExecution::pipeline("e")
            .stages([
                dag_stage("start", "0", &[]),
                dag_stage("a", "1", &["2"]),
                dag_stage("b", "2", &["1"]),
            ])
            .build();

        match execution.sorted_stages() {
            Err(GraphError::InvalidStageRelationships(e)) => {
                assert_eq!(e.edges.len(), 3);
                assert_eq!(e.unsorted.len(), 2);
            }
            other => panic!("expected relationship error, got {other:?}"),
        }
    }

    #[test]
    fn test_ancestors_and_descendants_agree() {
        let execution = release_train();
        let descendants = DescendantResolver::new(&execution);

        for stage in execution.stages() {
            let ancestors = execution.ancestors_of(stage.id()).unwrap();
            for other in execution.stages().iter().filter(|s| s.id() != stage.id()) {
                let is_ancestor = ancestors.iter().any(|a| a.id() == other.id());
                let is_upstream = descendants
                    .all_downstream_stages(other)
                    .iter()
                    .any(|d| d.id() == stage.id());
                assert_eq!(
                    is_ancestor,
                    is_upstream,
                    "{} vs {}",
                    stage.id(),
                    other.id()
                );
            }
        }
    }

    #[test]
    fn test_synthetic_ordering() {
        let parent = dag_stage("deploy", "1", &[]);
        let before = synthetic_stage(&parent, SyntheticStageOwner::StageBefore, "disable");
        let after = synthetic_stage(&parent, SyntheticStageOwner::StageAfter, "cleanup");
        let execution = TestExecution::pipeline("e")
            .stages([parent, before, after])
            .build();

        let after_ancestors = execution.ancestors_of("cleanup").unwrap();
        assert_contains_stage(&after_ancestors, "disable");
        assert_contains_stage(&after_ancestors, "deploy");
        assert_ordered_before(&after_ancestors, "disable", "deploy");

        let before_ancestors = execution.ancestors_of("disable").unwrap();
        assert_contains_stage(&before_ancestors, "deploy");
        assert_lacks_stage(&before_ancestors, "cleanup");
    }

    #[test]
    fn test_child_root_falls_back_to_latest_parent_stage() {
        let now = Utc::now();
        let parent = TestExecution::pipeline("parent")
            .stages([
                dag_stage("old", "1", &[]).with_times(
                    Some(now - Duration::minutes(20)),
                    Some(now - Duration::minutes(10)),
                ),
                failed_pipeline_stage("run-child", "child")
                    .with_times(Some(now - Duration::minutes(5)), Some(now)),
            ])
            .build();
        let child = TestExecution::pipeline("child")
            .stage(dag_stage("root", "1", &[]))
            .triggered_by(parent, None)
            .build();

        let root = child.stage_by_id("root").unwrap();
        let found = child.find_ancestor_of(root.id(), |_| false).unwrap();
        assert!(found.is_none());

        let ancestors = child.ancestors_of(root.id()).unwrap();
        assert_stage_ids(&ancestors, &["root", "run-child", "old"]);
    }

    #[test]
    fn test_ancestors_reach_grandparent_execution() {
        let grandparent = TestExecution::pipeline("gp")
            .stages([
                dag_stage("gp-bake", "1", &[]),
                Stage::new("pipeline")
                    .with_id("gp-run")
                    .with_ref_id("2")
                    .with_requisite_stage_ref_ids(["1"]),
            ])
            .build();
        let parent = TestExecution::pipeline("p")
            .stages([
                dag_stage("p-bake", "1", &[]),
                Stage::new("pipeline")
                    .with_id("p-run")
                    .with_ref_id("2")
                    .with_requisite_stage_ref_ids(["1"]),
            ])
            .triggered_by(grandparent, Some("gp-run"))
            .build();
        let child = TestExecution::pipeline("c")
            .stage(dag_stage("c-root", "1", &[]))
            .triggered_by(parent, Some("p-run"))
            .build();

        let ancestors = child.ancestors_of("c-root").unwrap();
        assert_stage_ids(&ancestors, &["c-root", "p-bake", "gp-bake"]);

        let found = child
            .find_ancestor_of("c-root", |s| s.id() == "gp-bake")
            .unwrap();
        assert_eq!(found.map(Stage::id), Some("gp-bake"));
        assert!(child.find_ancestor_of("c-root", |_| false).unwrap().is_none());
    }

    #[test]
    fn test_exception_message_degrades_to_sentinel() {
        let pipeline = Stage::new("pipeline").with_context_value("exception", json!("boom"));
        let bare_pipeline = Stage::new("pipeline");
        let run_job = Stage::new("runJobManifest");
        let run_job_odd = Stage::new("runJobManifest").with_context_value("kato.tasks", json!({}));

        for stage in [&pipeline, &bare_pipeline, &run_job, &run_job_odd] {
            assert_eq!(exception_message(stage), EXCEPTION_NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_failure_chain_follows_stored_child() {
        init_test_tracing();
        let repository = InMemoryExecutionRepository::new();
        let child = TestExecution::pipeline("child")
            .stage(
                dag_stage("explode", "1", &[])
                    .with_status(ExecutionStatus::Terminal)
                    .with_context_value("exception", json!({"details": {"errors": ["disk full"]}})),
            )
            .build();
        repository.store(child).await.unwrap();

        let parent = TestExecution::pipeline("parent")
            .stage(failed_pipeline_stage("run-child", "child"))
            .build();
        let stage = parent.stage_by_id("run-child").unwrap();

        let chain = FailureChainBuilder::new(FailureChainConfig::new())
            .build_chain(&repository, &parent, stage, 0)
            .await
            .unwrap();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].child_execution_id.as_deref(), Some("child"));
        assert_eq!(chain[1].execution_id, "child");
        assert_eq!(
            chain[0].child_pipeline_execution_url.as_deref(),
            Some(chain[1].pipeline_execution_url.as_str())
        );
    }

    #[tokio::test]
    async fn test_failure_chain_stops_at_missing_child() {
        init_test_tracing();
        let repository = InMemoryExecutionRepository::new();
        let parent = TestExecution::pipeline("parent")
            .stage(failed_pipeline_stage("run-child", "gone"))
            .build();
        let stage = parent.stage_by_id("run-child").unwrap();

        let chain = FailureChainBuilder::default()
            .build_chain(&repository, &parent, stage, 0)
            .await
            .unwrap();

        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].exception_message, EXCEPTION_NOT_FOUND);
    }

    #[test]
    fn test_builder_through_sort_and_ancestors() {
        let raw = [
            json!({"type": "bake", "refId": "1", "name": "Bake"}),
            json!({"type": "deploy", "providerType": "gce", "refId": "2", "requisiteStageRefIds": ["1"]}),
            json!({"type": "deploy", "providerType": "aws", "refId": "3", "requisiteStageRefIds": ["1"]}),
            json!({"type": "manualJudgment", "refId": "4", "requisiteStageRefIds": ["2", "3"]}),
        ];
        let execution = ExecutionBuilder::new(BuildOptions::new().with_name("release"))
            .build("orders", Some(&raw), Trigger::manual("alice"))
            .unwrap();

        let types: Vec<&str> = execution
            .stages()
            .iter()
            .map(|s| s.stage_type.as_str())
            .collect();
        assert_eq!(types, vec!["bake", "deploy_gce", "deploy", "manualJudgment"]);

        let sorted = execution.sorted_stages().unwrap();
        assert_topologically_sound(&sorted);

        let judgment = execution.stage_by_ref_id("4").unwrap();
        let bake = execution
            .find_ancestor_of(judgment.id(), |s| s.stage_type == "bake")
            .unwrap();
        assert_eq!(bake.map(Stage::name), Some("Bake"));
    }

    #[test]
    fn test_traversal_over_shared_snapshot() {
        let shared = release_train().into_shared();

        let snapshot = shared.snapshot();
        shared
            .write()
            .stage_by_id_mut("bake")
            .unwrap()
            .status = ExecutionStatus::Succeeded;

        let ancestors = snapshot.ancestors_of("verify").unwrap();
        assert_contains_stage(&ancestors, "bake");
        assert_eq!(
            snapshot.stage_by_id("bake").unwrap().status,
            ExecutionStatus::NotStarted
        );

        let guard = shared.read();
        let downstream = guard.all_downstream_stages_of("bake").unwrap();
        assert_eq!(downstream.len(), 5);
        assert!(guard.stage_by_id("bake").unwrap().has_succeeded());
    }
}
