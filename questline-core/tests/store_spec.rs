use speculate2::speculate;

speculate! {
    use questline_core::models::*;
    use questline_core::pulse::NO_RECOMMENDATION_MESSAGE;
    use questline_core::{Database, StoreError};

    before {
        let db = Database::open_memory().expect("in-memory database");
        let project = db
            .create_project(CreateProjectInput {
                name: "Side Quest".into(),
                path: "/code/side-quest".into(),
                tags: vec!["rust".into(), "cli".into()],
                ..Default::default()
            })
            .expect("project");
    }

    describe "projects" {
        it "derives a slug and keeps tags in order" {
            assert_eq!(project.slug, "side-quest");
            let stored = db.get_project(project.id).unwrap().unwrap();
            assert_eq!(stored.tags, vec!["rust".to_string(), "cli".to_string()]);
            assert_eq!(stored.health_score, 0);
        }

        it "reads empty tags back as an empty list" {
            let bare = db
                .create_project(CreateProjectInput {
                    name: "Bare".into(),
                    path: "/code/bare".into(),
                    ..Default::default()
                })
                .unwrap();
            assert!(db.get_project(bare.id).unwrap().unwrap().tags.is_empty());
        }

        it "suffixes derived slugs that are already taken" {
            let twin = db
                .create_project(CreateProjectInput {
                    name: "Side Quest".into(),
                    path: "/code/other-side-quest".into(),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(twin.slug, "side-quest-2");
        }

        it "rejects a duplicate path" {
            let err = db
                .create_project(CreateProjectInput {
                    name: "Copy".into(),
                    path: "/code/side-quest".into(),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
        }

        it "resolves by id, slug or path" {
            assert_eq!(db.resolve_project(&project.id.to_string()).unwrap().id, project.id);
            assert_eq!(db.resolve_project("side-quest").unwrap().id, project.id);
            assert_eq!(db.resolve_project("/code/side-quest").unwrap().id, project.id);
            assert!(matches!(
                db.resolve_project("nope"),
                Err(StoreError::NotFound { entity: "project", .. })
            ));
        }

        it "updates an existing path in place when re-registered" {
            let again = db
                .register_project(CreateProjectInput {
                    name: "Side Quest Renamed".into(),
                    path: "/code/side-quest".into(),
                    tags: vec!["rust".into()],
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(again.id, project.id);
            assert_eq!(again.name, "Side Quest Renamed");
            assert_eq!(again.slug, "side-quest");
            assert_eq!(db.list_projects(None).unwrap().len(), 1);
        }

        it "creates exactly one record for a new path" {
            let fresh = db
                .register_project(CreateProjectInput {
                    name: "Fresh".into(),
                    path: "/code/fresh".into(),
                    ..Default::default()
                })
                .unwrap();
            let all = db.list_projects(None).unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all.iter().filter(|p| p.id == fresh.id).count(), 1);
        }

        it "filters by status" {
            db.update_project(project.id, UpdateProjectInput {
                status: Some(ProjectStatus::Paused),
                ..Default::default()
            })
            .unwrap();
            assert!(db.list_projects(Some(ProjectStatus::Active)).unwrap().is_empty());
            assert_eq!(db.list_projects(Some(ProjectStatus::Paused)).unwrap().len(), 1);
        }

        it "cascades deletion to quests and tasks" {
            let quest = db
                .create_quest(project.id, CreateQuestInput { title: "Q".into(), ..Default::default() })
                .unwrap();
            let task = db
                .create_task(quest.id, CreateTaskInput { title: "T".into(), ..Default::default() })
                .unwrap();

            assert!(db.delete_project(project.id).unwrap());
            assert!(db.get_quest(quest.id).unwrap().is_none());
            assert!(db.get_task(task.id).unwrap().is_none());
            assert!(!db.delete_project(project.id).unwrap());
        }
    }

    describe "quests" {
        it "lists by descending priority" {
            let low = db
                .create_quest(project.id, CreateQuestInput { title: "low".into(), priority: 1, ..Default::default() })
                .unwrap();
            let high = db
                .create_quest(project.id, CreateQuestInput { title: "high".into(), priority: 5, ..Default::default() })
                .unwrap();
            let ids: Vec<_> = db.list_quests(Some(project.id)).unwrap().into_iter().map(|q| q.id).collect();
            assert_eq!(ids, vec![high.id, low.id]);
        }

        it "requires an existing project" {
            let err = db
                .create_quest(uuid::Uuid::new_v4(), CreateQuestInput { title: "Q".into(), ..Default::default() })
                .unwrap_err();
            assert!(matches!(err, StoreError::NotFound { entity: "project", .. }));
        }

        it "creates a backlog quest when none is open" {
            let backlog = db.default_quest_for(project.id).unwrap();
            assert_eq!(backlog.title, "Backlog");
            assert_eq!(backlog.state, QuestState::Active);
            assert_eq!(db.default_quest_for(project.id).unwrap().id, backlog.id);
        }
    }

    describe "tasks" {
        before {
            let quest = db
                .create_quest(project.id, CreateQuestInput {
                    title: "Ship it".into(),
                    state: Some(QuestState::Active),
                    priority: 2,
                    ..Default::default()
                })
                .unwrap();
            let task = db
                .create_task(quest.id, CreateTaskInput {
                    title: "Write docs".into(),
                    estimate_points: 2,
                    ..Default::default()
                })
                .unwrap();
        }

        it "stamps completion only while done" {
            assert!(task.completed_at.is_none());

            let done = db
                .update_task(task.id, UpdateTaskInput { state: Some(TaskState::Done), ..Default::default() })
                .unwrap();
            assert!(done.completed_at.is_some());

            let reopened = db
                .update_task(task.id, UpdateTaskInput { state: Some(TaskState::Doing), ..Default::default() })
                .unwrap();
            assert!(reopened.completed_at.is_none());

            let stored = db.get_task(task.id).unwrap().unwrap();
            assert_eq!(stored.state, TaskState::Doing);
            assert!(stored.completed_at.is_none());
        }

        it "creates done tasks with a completion time" {
            let done = db
                .create_task(quest.id, CreateTaskInput {
                    title: "Already shipped".into(),
                    state: Some(TaskState::Done),
                    ..Default::default()
                })
                .unwrap();
            assert!(done.completed_at.is_some());
        }

        it "defaults actual points to the estimate on completion" {
            let done = db.complete_task(task.id, None).unwrap();
            assert_eq!(done.state, TaskState::Done);
            assert_eq!(done.actual_points, Some(2));
        }

        it "preserves prior actual points on completion" {
            db.update_task(task.id, UpdateTaskInput { actual_points: Some(5), ..Default::default() })
                .unwrap();
            let done = db.complete_task(task.id, None).unwrap();
            assert_eq!(done.actual_points, Some(5));
            assert!(done.completed_at.is_some());
        }

        it "round-trips blockers" {
            let blockers = vec!["waiting on API key".to_string(), "flaky CI".to_string()];
            db.update_task(task.id, UpdateTaskInput { blockers: Some(blockers.clone()), ..Default::default() })
                .unwrap();
            assert_eq!(db.get_task(task.id).unwrap().unwrap().blockers, blockers);
        }

        it "reports unknown tasks as not found" {
            let err = db.complete_task(uuid::Uuid::new_v4(), None).unwrap_err();
            assert!(matches!(err, StoreError::NotFound { entity: "task", .. }));
        }

        it "rejects a blank title" {
            let err = db
                .update_task(task.id, UpdateTaskInput { title: Some("   ".into()), ..Default::default() })
                .unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)));
        }

        it "filters by project and state" {
            let other = db
                .create_project(CreateProjectInput { name: "Other".into(), path: "/code/other".into(), ..Default::default() })
                .unwrap();
            let other_quest = db
                .create_quest(other.id, CreateQuestInput { title: "Elsewhere".into(), ..Default::default() })
                .unwrap();
            db.create_task(other_quest.id, CreateTaskInput { title: "Not mine".into(), ..Default::default() })
                .unwrap();

            let mine = db
                .list_tasks(&TaskFilter { project_id: Some(project.id), ..Default::default() })
                .unwrap();
            assert_eq!(mine.len(), 1);
            assert_eq!(mine[0].id, task.id);

            let done = db
                .list_tasks(&TaskFilter { state: Some(TaskState::Done), ..Default::default() })
                .unwrap();
            assert!(done.is_empty());
            assert_eq!(db.list_tasks(&TaskFilter::default()).unwrap().len(), 2);
        }
    }

    describe "health propagation" {
        it "runs once per quest or task mutation" {
            let before = db.health_recompute_count();
            let quest = db
                .create_quest(project.id, CreateQuestInput { title: "Q".into(), ..Default::default() })
                .unwrap();
            assert_eq!(db.health_recompute_count(), before + 1);

            let task = db
                .create_task(quest.id, CreateTaskInput { title: "T".into(), ..Default::default() })
                .unwrap();
            assert_eq!(db.health_recompute_count(), before + 2);

            db.complete_task(task.id, None).unwrap();
            assert_eq!(db.health_recompute_count(), before + 3);

            db.update_project(project.id, UpdateProjectInput { name: Some("Renamed".into()), ..Default::default() })
                .unwrap();
            assert_eq!(db.health_recompute_count(), before + 3);
        }

        it "rescores the project and bumps its update time" {
            let quest = db
                .create_quest(project.id, CreateQuestInput { title: "Q".into(), ..Default::default() })
                .unwrap();
            let task = db
                .create_task(quest.id, CreateTaskInput { title: "T".into(), estimate_points: 3, ..Default::default() })
                .unwrap();
            let open = db.get_project(project.id).unwrap().unwrap();
            // 0 completion, no velocity, unblocked, fresh
            assert_eq!(open.health_score, 16);
            assert!(open.updated_at >= project.updated_at);

            db.complete_task(task.id, None).unwrap();
            let done = db.get_project(project.id).unwrap().unwrap();
            // 50 + 3 + 8 + 8
            assert_eq!(done.health_score, 69);
            assert!(done.updated_at >= open.updated_at);
        }
    }

    describe "pulse" {
        it "reports a stale empty project with the fallback action" {
            let pulse = db.project_pulse(project.id).unwrap();
            assert_eq!(pulse.completion_percent, 0);
            assert!(pulse.stale);
            assert_eq!(pulse.xp_earned, 0);
            assert_eq!(pulse.next_action, NO_RECOMMENDATION_MESSAGE);
        }

        it "uses the recommendation as the next action" {
            let quest = db
                .create_quest(project.id, CreateQuestInput { title: "Launch".into(), ..Default::default() })
                .unwrap();
            db.create_task(quest.id, CreateTaskInput { title: "Record demo".into(), ..Default::default() })
                .unwrap();
            let done = db
                .create_task(quest.id, CreateTaskInput { title: "Write copy".into(), estimate_points: 4, ..Default::default() })
                .unwrap();
            db.complete_task(done.id, Some(6)).unwrap();

            let pulse = db.project_pulse(project.id).unwrap();
            assert_eq!(pulse.completion_percent, 50);
            assert_eq!(pulse.tasks_todo, 1);
            assert_eq!(pulse.tasks_done, 1);
            assert_eq!(pulse.velocity_7d, 1);
            assert_eq!(pulse.xp_earned, 6);
            assert!(!pulse.stale);
            assert_eq!(pulse.next_action, "Push Record demo (Launch) forward.");
        }

        it "fails for an unknown project" {
            assert!(matches!(
                db.project_pulse(uuid::Uuid::new_v4()),
                Err(StoreError::NotFound { .. })
            ));
        }
    }

    describe "recommendation" {
        it "returns nothing without open work" {
            assert!(db.next_task_recommendation(None).unwrap().is_none());

            let quest = db
                .create_quest(project.id, CreateQuestInput { title: "Q".into(), ..Default::default() })
                .unwrap();
            db.create_task(quest.id, CreateTaskInput {
                title: "Finished".into(),
                state: Some(TaskState::Done),
                ..Default::default()
            })
            .unwrap();
            db.create_task(quest.id, CreateTaskInput {
                title: "Stuck".into(),
                state: Some(TaskState::Blocked),
                ..Default::default()
            })
            .unwrap();
            assert!(db.next_task_recommendation(Some(project.id)).unwrap().is_none());
        }

        it "picks the unblocked high priority task" {
            let urgent = db
                .create_quest(project.id, CreateQuestInput {
                    title: "questTitle".into(),
                    state: Some(QuestState::Active),
                    priority: 3,
                    ..Default::default()
                })
                .unwrap();
            let minor = db
                .create_quest(project.id, CreateQuestInput {
                    title: "minor".into(),
                    state: Some(QuestState::Active),
                    priority: 1,
                    ..Default::default()
                })
                .unwrap();
            let a = db
                .create_task(urgent.id, CreateTaskInput { title: "A".into(), ..Default::default() })
                .unwrap();
            db.create_task(minor.id, CreateTaskInput {
                title: "B".into(),
                state: Some(TaskState::Doing),
                blockers: vec!["waiting on review".into()],
                ..Default::default()
            })
            .unwrap();

            let pick = db.next_task_recommendation(Some(project.id)).unwrap().unwrap();
            assert_eq!(pick.task_id, a.id);
            assert_eq!(pick.project_id, project.id);
            assert_eq!(pick.score, 75);
            assert_eq!(pick.reason, "Push A (questTitle) forward.");
        }

        it "respects the project filter" {
            let other = db
                .create_project(CreateProjectInput { name: "Other".into(), path: "/code/other".into(), ..Default::default() })
                .unwrap();
            let quest = db
                .create_quest(other.id, CreateQuestInput { title: "Q".into(), priority: 9, ..Default::default() })
                .unwrap();
            let task = db
                .create_task(quest.id, CreateTaskInput { title: "Elsewhere".into(), ..Default::default() })
                .unwrap();

            assert!(db.next_task_recommendation(Some(project.id)).unwrap().is_none());
            assert_eq!(db.next_task_recommendation(None).unwrap().unwrap().task_id, task.id);
        }
    }

    describe "session events" {
        it "round-trips suggestions and metadata" {
            let mut metadata = std::collections::BTreeMap::new();
            metadata.insert("shell".to_string(), "zsh".to_string());
            let event = db
                .create_session_event(CreateSessionEventInput {
                    agent: AgentKind::Claude,
                    cwd: "/code/side-quest".into(),
                    command: "claude".into(),
                    suggested_task_ids: vec!["abc".into()],
                    metadata: metadata.clone(),
                    ..Default::default()
                })
                .unwrap();

            let stored = db.list_session_events(10).unwrap();
            assert_eq!(stored.len(), 1);
            assert_eq!(stored[0].id, event.id);
            assert_eq!(stored[0].agent, AgentKind::Claude);
            assert_eq!(stored[0].suggested_task_ids, vec!["abc".to_string()]);
            assert_eq!(stored[0].metadata, metadata);
        }

        it "requires a working directory" {
            let err = db
                .create_session_event(CreateSessionEventInput {
                    cwd: " ".into(),
                    command: "codex".into(),
                    ..Default::default()
                })
                .unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)));
        }
    }
}
