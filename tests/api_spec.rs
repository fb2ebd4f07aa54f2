use speculate2::speculate;

speculate! {
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::json;
    use tasksync::api::{create_router, HealthResponse, TaxonomyReloaded};
    use tasksync::sync::{SyncEngine, SyncResult, SyncStatus, SyncPhase};
    use tasksync_core::models::*;
    use tasksync_core::reconcile::{ChangeAnalysis, ConflictInfo};
    use tasksync_core::taxonomy::{CategoryMapping, Taxonomy, TaxonomyHandle};
    use tasksync_core::Database;

    fn engine() -> Arc<SyncEngine> {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to migrate");
        let taxonomy = Taxonomy::new(&[
            CategoryMapping { name: "work".into(), project_id: "p-work".into() },
            CategoryMapping { name: "personal".into(), project_id: "p-home".into() },
        ])
        .unwrap();
        Arc::new(SyncEngine::new(db, None, TaxonomyHandle::new(taxonomy)))
    }

    fn server_with(config_path: Option<PathBuf>) -> TestServer {
        TestServer::new(create_router(engine(), config_path)).unwrap()
    }

    fn server() -> TestServer {
        server_with(None)
    }

    async fn create(server: &TestServer, content: &str, project_id: &str) -> Task {
        let response = server
            .post("/tasks")
            .json(&json!({ "content": content, "project_id": project_id }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Task>()
    }

    describe "health" {
        it "reports ok" {
            tokio_test::block_on(async {
                let response = server().get("/health").await;
                response.assert_status_ok();
                assert_eq!(response.json::<HealthResponse>().status, "ok");
            });
        }
    }

    describe "tasks" {
        it "creates and lists tasks" {
            tokio_test::block_on(async {
                let server = server();
                create(&server, "Buy milk", "p-home").await;
                create(&server, "Write report", "p-work").await;

                let all = server.get("/tasks").await.json::<Vec<Task>>();
                assert_eq!(all.len(), 2);

                let work = server
                    .get("/tasks")
                    .add_query_param("project_id", "p-work")
                    .await
                    .json::<Vec<Task>>();
                assert_eq!(work.len(), 1);
                assert_eq!(work[0].content, "Write report");
            });
        }

        it "rejects empty content" {
            tokio_test::block_on(async {
                server()
                    .post("/tasks")
                    .json(&json!({ "content": "  ", "project_id": "p-home" }))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
            });
        }

        it "lists projects and labels" {
            tokio_test::block_on(async {
                let server = server();
                server.get("/projects").await.assert_status_ok();
                assert!(server.get("/labels").await.json::<Vec<Label>>().is_empty());
                assert!(server.get("/projects").await.json::<Vec<Project>>().is_empty());
            });
        }

        it "updates a task" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                let response = server
                    .patch(&format!("/tasks/{}", task.id))
                    .json(&json!({ "priority": 3, "project_id": "p-work" }))
                    .await;
                response.assert_status_ok();
                let updated = response.json::<Task>();
                assert_eq!(updated.priority, 3);
                assert_eq!(updated.project_id, "p-work");
            });
        }

        it "returns 404 for unknown tasks" {
            tokio_test::block_on(async {
                let server = server();
                server
                    .patch("/tasks/nope")
                    .json(&json!({ "priority": 2 }))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);
                server.get("/tasks/nope/changes").await.assert_status(StatusCode::NOT_FOUND);
                server.delete("/tasks/nope").await.assert_status(StatusCode::NOT_FOUND);
            });
        }

        it "completes a task without a body and records history" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                let response = server.post(&format!("/tasks/{}/complete", task.id)).await;
                response.assert_status_ok();
                let record = response.json::<CompletionRecord>();
                assert_eq!(record.task_id, task.id);
                assert_eq!(record.actual_minutes, None);

                let history = server
                    .get("/completions")
                    .add_query_param("task_id", &task.id)
                    .await
                    .json::<Vec<CompletionRecord>>();
                assert_eq!(history.len(), 1);
            });
        }

        it "deletes a task" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                server
                    .delete(&format!("/tasks/{}", task.id))
                    .await
                    .assert_status(StatusCode::NO_CONTENT);
                assert!(server.get("/tasks").await.json::<Vec<Task>>().is_empty());
            });
        }
    }

    describe "classification" {
        it "lists unclassified tasks until a category is saved" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                let changes = server
                    .get(&format!("/tasks/{}/changes", task.id))
                    .await
                    .json::<ChangeAnalysis>();
                assert!(changes.needs_reclassify);
                assert_eq!(changes.reason, "never classified");

                let pending = server.get("/classification/pending").await.json::<Vec<ChangeAnalysis>>();
                assert_eq!(pending.len(), 1);

                server
                    .put(&format!("/tasks/{}/metadata", task.id))
                    .json(&json!({ "field": "recommended_category", "value": "personal" }))
                    .await
                    .assert_status(StatusCode::NO_CONTENT);

                let pending = server.get("/classification/pending").await.json::<Vec<ChangeAnalysis>>();
                assert!(pending.is_empty());
            });
        }

        it "stores descriptive details and records the category on completion" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                let response = server
                    .put(&format!("/tasks/{}/details", task.id))
                    .json(&json!({ "category": "errands", "size": "S", "needs_supplies": true }))
                    .await;
                response.assert_status_ok();
                let meta = response.json::<TaskMetadata>();
                assert_eq!(meta.category.as_deref(), Some("errands"));
                assert_eq!(meta.size.as_deref(), Some("S"));

                server
                    .put("/tasks/nope/details")
                    .json(&json!({ "category": "errands" }))
                    .await
                    .assert_status(StatusCode::NOT_FOUND);

                let record = server
                    .post(&format!("/tasks/{}/complete", task.id))
                    .await
                    .json::<CompletionRecord>();
                assert_eq!(record.category.as_deref(), Some("errands"));
            });
        }

        it "rejects an unknown classification source" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                server
                    .put(&format!("/tasks/{}/metadata", task.id))
                    .json(&json!({ "field": "classification_source", "value": "robot" }))
                    .await
                    .assert_status(StatusCode::BAD_REQUEST);
            });
        }

        it "reports conflicts between project and recommendation" {
            tokio_test::block_on(async {
                let server = server();
                let task = create(&server, "Buy milk", "p-home").await;

                server
                    .put(&format!("/tasks/{}/metadata", task.id))
                    .json(&json!({ "field": "recommended_category", "value": "work" }))
                    .await
                    .assert_status(StatusCode::NO_CONTENT);

                let conflicts = server.get("/conflicts").await.json::<Vec<ConflictInfo>>();
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].project_category.as_deref(), Some("personal"));
                assert_eq!(conflicts[0].recommended_project_id.as_deref(), Some("p-work"));
            });
        }

        it "reloads the taxonomy from the config file" {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "[[taxonomy.categories]]\nname = \"errands\"\nproject_id = \"p-home\"").unwrap();

            tokio_test::block_on(async {
                let server = server_with(Some(file.path().to_path_buf()));
                let task = create(&server, "Buy milk", "p-home").await;
                server
                    .put(&format!("/tasks/{}/metadata", task.id))
                    .json(&json!({ "field": "recommended_category", "value": "errands" }))
                    .await;
                assert_eq!(server.get("/conflicts").await.json::<Vec<ConflictInfo>>().len(), 1);

                let response = server.post("/taxonomy/reload").await;
                response.assert_status_ok();
                assert_eq!(response.json::<TaxonomyReloaded>().categories, 1);

                assert!(server.get("/conflicts").await.json::<Vec<ConflictInfo>>().is_empty());
            });
        }
    }

    describe "sync" {
        it "fails a pass without a provider and reports status" {
            tokio_test::block_on(async {
                let server = server();

                let result = server.post("/sync").await.json::<SyncResult>();
                assert!(!result.success);
                assert!(result.error.is_some());

                let status = server.get("/sync/status").await.json::<SyncStatus>();
                assert_eq!(status.phase, SyncPhase::Idle);
                assert!(status.standalone);
                assert!(status.last_error.is_some());
                assert!(status.last_sync_at.is_none());
            });
        }
    }
}
