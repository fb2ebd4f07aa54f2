use speculate2::speculate;

speculate! {
    use std::collections::HashMap;

    use chrono::{DateTime, TimeZone, Utc};
    use tasksync_core::models::*;
    use tasksync_core::reconcile::*;
    use tasksync_core::taxonomy::{CategoryMapping, Taxonomy};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, hour, 0, 0).unwrap()
    }

    fn task(content: &str, project_id: &str, updated_at: DateTime<Utc>) -> Task {
        Task {
            id: "task-1".into(),
            content: content.into(),
            description: None,
            project_id: project_id.into(),
            parent_id: None,
            priority: 1,
            labels: vec!["errand".into(), "quick".into()],
            due: None,
            is_completed: false,
            completed_at: None,
            created_at: at(1),
            updated_at,
        }
    }

    fn classified(category: &str, classified_at: DateTime<Utc>) -> TaskMetadata {
        TaskMetadata::new("task-1")
            .with_classification(ClassifiedField::RecommendedCategory, category, classified_at)
            .with_classification(ClassifiedField::TimeEstimateMinutes, 15, classified_at)
            .with_classification(ClassifiedField::PriorityScore, 0.4, classified_at)
    }

    fn snapshot_of(task: &Task) -> Snapshot {
        Snapshot { task: task.clone(), synced_at: at(2) }
    }

    describe "detect_changes" {
        describe "without metadata" {
            it "needs reclassification because the task was never classified" {
                let remote = task("Buy milk", "work-project", at(5));

                let no_snapshot = detect_changes(&remote, None, None);
                let with_snapshot = detect_changes(&remote, None, Some(&snapshot_of(&remote)));

                for analysis in [no_snapshot, with_snapshot] {
                    assert!(analysis.needs_reclassify);
                    assert_eq!(analysis.reason, "never classified");
                    assert!(analysis.changed_fields.is_empty());
                }
            }
        }

        describe "without a snapshot" {
            it "needs reclassification only when no recommendation exists" {
                let remote = task("Buy milk", "work-project", at(5));

                let bare = TaskMetadata::new("task-1");
                let analysis = detect_changes(&remote, Some(&bare), None);
                assert!(analysis.needs_reclassify);
                assert_eq!(analysis.reason, "no recommended category");

                let meta = classified("work", at(3));
                let analysis = detect_changes(&remote, Some(&meta), None);
                assert!(!analysis.needs_reclassify);
                assert!(analysis.changed_fields.is_empty());
            }

            it "treats a recommendation without a timestamp as absent" {
                let remote = task("Buy milk", "work-project", at(5));
                let mut meta = TaskMetadata::new("task-1");
                meta.fields.insert(
                    ClassifiedField::RecommendedCategory,
                    Classification { value: "work".into(), classified_at: None },
                );

                let analysis = detect_changes(&remote, Some(&meta), None);
                assert!(analysis.needs_reclassify);
            }
        }

        describe "with an identical snapshot" {
            it "reports no changes even when labels are reordered" {
                let snapshot_task = task("Buy milk", "work-project", at(5));
                let mut remote = snapshot_task.clone();
                remote.labels.reverse();
                let meta = classified("work", at(3));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&snapshot_task)));

                assert!(analysis.changed_fields.is_empty());
                assert!(!analysis.needs_reclassify);
                assert!(!analysis.any_changed_manually);
                assert_eq!(analysis.reason, "no changes");
            }
        }

        it "is idempotent" {
            let before = task("Buy milk", "work-project", at(2));
            let remote = task("Renew passport", "personal-project", at(6));
            let meta = classified("work", at(3));
            let snapshot = snapshot_of(&before);

            let first = detect_changes(&remote, Some(&meta), Some(&snapshot));
            let second = detect_changes(&remote, Some(&meta), Some(&snapshot));

            assert_eq!(first, second);
        }

        describe "timestamp ordering" {
            it "does not flag changes recorded at or before classification as manual" {
                let before = task("Buy milk", "work-project", at(2));
                let meta = classified("work", at(4));

                for updated in [at(3), at(4)] {
                    let remote = task("Buy milk", "personal-project", updated);
                    let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                    assert_eq!(analysis.changed_fields.len(), 1);
                    assert_eq!(analysis.changed_fields[0].field, TrackedField::ProjectId);
                    assert!(!analysis.changed_fields[0].changed_manually);
                    assert!(!analysis.project_changed_manually);
                    assert!(!analysis.needs_reclassify);
                    assert_eq!(analysis.reason, "changes before classification");
                }
            }

            it "records old and new values for each changed field" {
                let before = task("Buy milk", "work-project", at(2));
                let mut remote = task("Buy milk", "work-project", at(6));
                remote.priority = 4;
                let meta = classified("work", at(3));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                assert_eq!(analysis.changed_fields.len(), 1);
                let change = &analysis.changed_fields[0];
                assert_eq!(change.field, TrackedField::Priority);
                assert_eq!(change.old_value, serde_json::json!(1));
                assert_eq!(change.new_value, serde_json::json!(4));
                assert!(change.changed_manually);
                assert!(analysis.any_changed_manually);
                assert!(!analysis.needs_reclassify);
                assert_eq!(analysis.reason, "changed manually: priority");
            }
        }

        describe "scenarios" {
            it "A: a manual project move after classification needs reclassification" {
                let before = task("Buy milk", "work-project", at(2));
                let remote = task("Buy milk", "personal-project", at(6));
                let meta = classified("work", at(3));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                assert!(analysis.project_changed_manually);
                assert!(analysis.needs_reclassify);
                assert_eq!(analysis.reason, "changed manually: project_id");
            }

            it "B: a move recorded before classification is not manual" {
                let before = task("Buy milk", "work-project", at(2));
                let remote = task("Buy milk", "personal-project", at(3));
                let meta = classified("work", at(6));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                assert!(!analysis.project_changed_manually);
                assert!(!analysis.any_changed_manually);
            }

            it "C: punctuation-only content edits do not trigger reclassification" {
                let before = task("Buy milk", "work-project", at(2));
                let remote = task("Buy milk.", "work-project", at(6));
                let meta = classified("work", at(3));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                assert!(analysis.content_changed_manually);
                assert!(!analysis.content_change_significant);
                assert!(!analysis.needs_reclassify);
            }

            it "D: a substantive content rewrite triggers reclassification" {
                let before = task("Buy milk", "work-project", at(2));
                let remote = task("Renew passport and book travel insurance", "work-project", at(6));
                let meta = classified("work", at(3));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                assert!(analysis.content_changed_manually);
                assert!(analysis.content_change_significant);
                assert!(analysis.needs_reclassify);
            }

            it "treats same-length rewording with different words as significant" {
                let before = task("buy milk today", "work-project", at(2));
                let remote = task("buy eggs today", "work-project", at(6));
                let meta = classified("work", at(3));

                let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

                assert!(analysis.needs_reclassify);
            }
        }

        it "lists every manually changed field in the reason" {
            let before = task("Buy milk", "work-project", at(2));
            let mut remote = task("Buy oat milk", "personal-project", at(6));
            remote.labels = vec!["errand".into()];
            let meta = classified("work", at(3));

            let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));

            assert_eq!(analysis.reason, "changed manually: content, project_id, labels");
        }

        it "honours custom significance thresholds" {
            let before = task("Buy milk", "work-project", at(2));
            let remote = task("Buy milk and bread", "work-project", at(6));
            let meta = classified("work", at(3));
            let lenient = Reconciler::new(SignificanceThresholds {
                length_ratio_min: 0.1,
                length_ratio_max: 10.0,
                word_change_ratio: 0.9,
            });

            let analysis = lenient.detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));
            assert!(!analysis.needs_reclassify);

            let analysis = detect_changes(&remote, Some(&meta), Some(&snapshot_of(&before)));
            assert!(analysis.needs_reclassify);
        }
    }

    describe "find_conflicts" {
        it "reports open tasks filed outside their recommended category" {
            let taxonomy = Taxonomy::new(&[
                CategoryMapping { name: "work".into(), project_id: "work-project".into() },
                CategoryMapping { name: "personal".into(), project_id: "personal-project".into() },
            ]).unwrap();
            let projects = vec![
                Project { id: "work-project".into(), name: "Work".into(), parent_id: None, color: None, is_inbox: false },
                Project { id: "personal-project".into(), name: "Personal".into(), parent_id: None, color: None, is_inbox: false },
            ];

            let mut misfiled = task("Buy milk", "work-project", at(2));
            misfiled.id = "misfiled".into();
            let mut aligned = task("Write report", "work-project", at(2));
            aligned.id = "aligned".into();
            let mut done = task("Old errand", "work-project", at(2));
            done.id = "done".into();
            done.is_completed = true;
            let mut unclassified = task("Unknown", "work-project", at(2));
            unclassified.id = "unclassified".into();

            let mut metadata = HashMap::new();
            for (id, category) in [("misfiled", "personal"), ("aligned", "work"), ("done", "personal")] {
                let mut meta = classified(category, at(3));
                meta.task_id = id.into();
                metadata.insert(id.to_string(), meta);
            }

            let conflicts = find_conflicts(
                &[misfiled, aligned, done, unclassified],
                &projects,
                &metadata,
                &taxonomy,
            );

            assert_eq!(conflicts.len(), 1);
            let conflict = &conflicts[0];
            assert_eq!(conflict.task_id, "misfiled");
            assert_eq!(conflict.project_name.as_deref(), Some("Work"));
            assert_eq!(conflict.project_category.as_deref(), Some("work"));
            assert_eq!(conflict.recommended_category, "personal");
            assert_eq!(conflict.recommended_project_id.as_deref(), Some("personal-project"));
        }
    }
}
