//! 策略引擎与会话时间线的集成测试（ManualClock 控制时间）

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use tempfile::TempDir;

    use omnisense::agent::AgentRuntime;
    use omnisense::config::AppConfig;
    use omnisense::core::{AgentBuilder, AgentError, ManualClock, Observation};
    use omnisense::llm::MockLlmClient;
    use omnisense::policy::{PolicyDraft, PolicyRejection, PrivacyMode};
    use omnisense::react::StepInput;
    use omnisense::research::NoResearch;
    use omnisense::session::EventKind;

    async fn runtime(dir: &TempDir, clock: Arc<ManualClock>, in_memory: bool) -> AgentRuntime {
        let mut builder = AgentBuilder::new(AppConfig::default())
            .with_data_dir(dir.path())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_research(Arc::new(NoResearch))
            .with_clock(clock);
        if in_memory {
            builder = builder.in_memory();
        }
        builder.build().await
    }

    fn obs(v: Value) -> Observation {
        v.as_object().cloned().unwrap()
    }

    fn draft(v: Value) -> PolicyDraft {
        serde_json::from_value(v).unwrap()
    }

    fn nudge_policy(id: &str, safeguards: Value) -> PolicyDraft {
        draft(json!({
            "id": id,
            "intent": "nudge the user when the room gets loud",
            "triggers": { "threshold": { "key": "loudness", "gte": 0.8 } },
            "actions": [ { "name": "agent.event", "args": { "kind": "policy.fired", "details": { "id": id } } } ],
            "safeguards": safeguards,
            "ttlMs": 3_600_000
        }))
    }

    async fn fired(rt: &AgentRuntime, id: &str) -> usize {
        let session = rt.sessions().status().await.unwrap();
        session
            .system_events("policy.fired")
            .filter(|e| e.payload["details"]["id"] == id)
            .count()
    }

    #[tokio::test]
    async fn test_admission_round_trip() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir, Arc::new(ManualClock::new(0)), true).await;

        let ok = rt
            .policies()
            .create(draft(json!({
                "id": "follow-up",
                "intent": "schedule a follow-up",
                "triggers": { "match": { "meeting_ended": true } },
                "actions": [ { "name": "calendar.create_event", "args": { "title": "Follow-up" } } ],
                "ttlMs": 60_000
            })))
            .await;
        assert!(ok.is_ok());

        let rejected = rt
            .policies()
            .create(draft(json!({
                "id": "bad",
                "intent": "diagnose the speaker's stress",
                "triggers": { "anyTrue": [ { "path": "stressed" } ] },
                "actions": [ { "name": "notes.write", "args": { "text": "x" } } ],
                "ttlMs": 60_000
            })))
            .await;
        assert_eq!(rejected.unwrap_err(), PolicyRejection::ForbiddenScope);
        assert_eq!(PolicyRejection::ForbiddenScope.to_string(), "forbidden_scope");

        let ids: Vec<String> = rt.policies().list().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["follow-up"]);
    }

    #[tokio::test]
    async fn test_activate_policy_surfaces_rejection_as_agent_error() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir, Arc::new(ManualClock::new(0)), true).await;

        let err = rt
            .activate_policy(draft(json!({
                "id": "bad",
                "intent": "diagnose the speaker's stress",
                "triggers": { "anyTrue": [ { "path": "stressed" } ] },
                "actions": [ { "name": "notes.write", "args": { "text": "x" } } ],
                "ttlMs": 60_000
            })))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::PolicyRejected(PolicyRejection::ForbiddenScope)
        ));
        assert_eq!(err.to_string(), "forbidden_scope");

        let policy = rt.activate_policy(nudge_policy("ok", json!({ "privacyFloor": "off" }))).await.unwrap();
        assert_eq!(policy.id, "ok");
        assert_eq!(rt.policies().list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_policy_is_pruned_and_never_fires() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(10_000));
        let rt = runtime(&dir, clock.clone(), true).await;
        rt.sessions().start().await;

        let mut short = nudge_policy("short", json!({ "cooldownMs": 0, "privacyFloor": "off" }));
        short.ttl_ms = 1_000;
        rt.policies().create(short).await.unwrap();
        assert_eq!(rt.policies().list().await.len(), 1);

        clock.advance(1_001);
        assert!(rt.policies().list().await.is_empty());
        rt.policies()
            .evaluate(&obs(json!({"loudness": 0.95})), PrivacyMode::Cloud)
            .await;
        assert_eq!(fired(&rt, "short").await, 0);
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(100_000));
        let rt = runtime(&dir, clock.clone(), true).await;
        rt.sessions().start().await;
        rt.policies()
            .create(nudge_policy("cool", json!({ "cooldownMs": 60_000, "privacyFloor": "off" })))
            .await
            .unwrap();
        let loud = obs(json!({"loudness": 0.9}));

        rt.policies().evaluate(&loud, PrivacyMode::Cloud).await;
        assert_eq!(fired(&rt, "cool").await, 1);

        clock.advance(30_000);
        rt.policies().evaluate(&loud, PrivacyMode::Cloud).await;
        assert_eq!(fired(&rt, "cool").await, 1);

        clock.set(100_000 + 60_001);
        rt.policies().evaluate(&loud, PrivacyMode::Cloud).await;
        assert_eq!(fired(&rt, "cool").await, 2);

        let policy = rt.policies().list().await.remove(0);
        assert_eq!(policy.fire_count, 2);
        assert_eq!(policy.last_fired_at, Some(160_001));
    }

    #[tokio::test]
    async fn test_privacy_floor() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir, Arc::new(ManualClock::new(0)), true).await;
        rt.sessions().start().await;
        rt.policies()
            .create(nudge_policy("cloud-only", json!({ "privacyFloor": "cloud" })))
            .await
            .unwrap();
        rt.policies()
            .create(nudge_policy("local-ok", json!({ "privacyFloor": "local" })))
            .await
            .unwrap();

        rt.policies()
            .evaluate(&obs(json!({"loudness": 1.0})), PrivacyMode::Local)
            .await;
        assert_eq!(fired(&rt, "cloud-only").await, 0);
        assert_eq!(fired(&rt, "local-ok").await, 1);
    }

    #[tokio::test]
    async fn test_step_triggers_policies_with_preference_privacy() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir, Arc::new(ManualClock::new(0)), true).await;
        rt.sessions().start().await;
        rt.policies()
            .create(nudge_policy("from-step", json!({ "privacyFloor": "cloud" })))
            .await
            .unwrap();

        let local = json!({"privacyMode": "local"}).as_object().cloned().unwrap();
        rt.run_step(StepInput::new(obs(json!({"loudness": 0.99}))).with_preferences(local))
            .await;
        assert_eq!(fired(&rt, "from-step").await, 0);

        rt.run_step(StepInput::new(obs(json!({"loudness": 0.99})))).await;
        assert_eq!(fired(&rt, "from-step").await, 1);
    }

    #[tokio::test]
    async fn test_session_events_require_active_session() {
        let dir = TempDir::new().unwrap();
        let rt = runtime(&dir, Arc::new(ManualClock::new(0)), true).await;
        let sessions = rt.sessions();

        sessions.add_event(EventKind::Note, json!({"text": "early"})).await;
        assert!(sessions.status().await.is_none());

        let started = sessions.start().await;
        assert!(started.events.is_empty());
        for i in 0..5 {
            sessions.add_event(EventKind::Insight, json!({"n": i})).await;
        }
        let session = sessions.status().await.unwrap();
        assert_eq!(session.events.len(), 5);
        let order: Vec<i64> = session
            .events
            .iter()
            .map(|e| e.payload["n"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        let stopped = sessions.stop().await.unwrap();
        assert!(!stopped.is_active());
        sessions.add_event(EventKind::Note, json!({"text": "late"})).await;
        assert_eq!(sessions.status().await.unwrap().events.len(), 5);
        assert!(sessions.stop().await.is_none());
    }

    #[tokio::test]
    async fn test_file_backed_state_survives_rebuild() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(5_000));
        {
            let rt = runtime(&dir, clock.clone(), false).await;
            rt.sessions().start().await;
            rt.sessions()
                .add_event(EventKind::Note, json!({"text": "persist me"}))
                .await;
            rt.policies()
                .create(nudge_policy("durable", json!({ "privacyFloor": "off" })))
                .await
                .unwrap();
            rt.run_step(StepInput::default()).await;
        }

        let rt = runtime(&dir, clock, false).await;
        let session = rt.sessions().status().await.unwrap();
        assert!(session.is_active());
        assert_eq!(session.events[0].payload["text"], "persist me");
        assert_eq!(rt.policies().list().await[0].id, "durable");

        let audit = rt.audit().read_recent(200).await;
        assert!(audit.iter().any(|r| r["type"] == "agent_step"));
        assert!(audit.iter().any(|r| r["type"] == "agent_prompt"));
        assert!(audit.iter().all(|r| r["ts"] == 5_000));
    }
}
