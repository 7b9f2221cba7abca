//! 会话准入控制集成测试
//!
//! 覆盖并发上限、同设备替换、过期会话不占名额、并发准入竞态

use drm_system::{
    error::AppError,
    models::audit::AuditEventType,
    models::license::LicenseType,
    repository::StreamRepository,
    services::license_service::IssueLicenseParams,
    services::session_service::AdmitParams,
};
use serial_test::serial;
use uuid::Uuid;

mod common;
use common::{
    age_stream_heartbeat, count_events, create_test_app_state, create_test_config, device,
    setup_test_db, test_client,
};

/// 准备一个持有有效许可的用户
async fn setup_licensed_user(
    state: &drm_system::middleware::AppState,
    pool: &sqlx::PgPool,
) -> (Uuid, Uuid) {
    let user_id = common::create_test_user(pool).await;
    let episode_id = common::create_test_episode(pool).await;

    state
        .license_service
        .issue(
            IssueLicenseParams {
                user_id,
                episode_id,
                license_type: LicenseType::Stream,
                device_id: None,
                ttl_secs: None,
            },
            &test_client(),
        )
        .await
        .unwrap();

    (user_id, episode_id)
}

#[tokio::test]
#[serial]
async fn test_admission_scenario_with_limit_two() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool.clone());

    let (user_id, episode_id) = setup_licensed_user(&state, &pool).await;

    // deviceA、deviceB 准入成功
    let stream_a = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-a"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await
        .unwrap();

    state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-b"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await
        .unwrap();

    // deviceC 被并发上限挡住
    let result = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-c"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await;
    assert!(matches!(
        result,
        Err(AppError::ConcurrencyLimitExceeded { limit: 2 })
    ));
    assert_eq!(
        count_events(&state, user_id, AuditEventType::ConcurrentStreamBlocked).await,
        1
    );

    // deviceA 结束后 deviceC 可以进来
    state
        .session_service
        .end(&stream_a.session_token, "ended by client", &test_client())
        .await
        .unwrap();

    state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-c"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await
        .unwrap();

    let sessions = state.session_service.list_sessions(user_id).await.unwrap();
    assert_eq!(sessions.len(), 2);
}

#[tokio::test]
#[serial]
async fn test_same_device_replaces_not_duplicates() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool.clone());

    let (user_id, episode_id) = setup_licensed_user(&state, &pool).await;

    let first = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-a"),
                max_concurrent_streams: 1,
            },
            &test_client(),
        )
        .await
        .unwrap();

    // 同设备重开：即便上限已满也要替换原会话而不是拒绝
    let second = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-a"),
                max_concurrent_streams: 1,
            },
            &test_client(),
        )
        .await
        .unwrap();

    // 行被替换：同一行 id，新令牌
    assert_eq!(first.id, second.id);
    assert_ne!(first.session_token, second.session_token);

    let sessions = state.session_service.list_sessions(user_id).await.unwrap();
    assert_eq!(sessions.len(), 1);

    // 旧令牌已失效
    let result = state.session_service.heartbeat(&first.session_token).await;
    assert!(matches!(result, Err(AppError::SessionNotFound)));
    state
        .session_service
        .heartbeat(&second.session_token)
        .await
        .unwrap();
}

#[tokio::test]
#[serial]
async fn test_stale_sessions_do_not_block_admission() {
    let config = create_test_config();
    let stale_secs = config.playback.heartbeat_stale_secs;
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool.clone());

    let (user_id, episode_id) = setup_licensed_user(&state, &pool).await;

    let stream_a = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-a"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await
        .unwrap();

    // deviceA 的心跳超过过期窗口：即使还没被清扫，也不占并发名额
    age_stream_heartbeat(&pool, &stream_a.session_token, stale_secs + 10).await;

    let repo = StreamRepository::new(pool.clone());
    assert_eq!(repo.count_live_streams(user_id, stale_secs).await.unwrap(), 0);

    for device_id in ["device-b", "device-c"] {
        state
            .session_service
            .admit(
                AdmitParams {
                    user_id,
                    episode_id,
                    device: &device(device_id),
                    max_concurrent_streams: 2,
                },
                &test_client(),
            )
            .await
            .unwrap();
    }

    assert_eq!(repo.count_live_streams(user_id, stale_secs).await.unwrap(), 2);
}

#[tokio::test]
#[serial]
async fn test_parallel_admissions_respect_limit() {
    let config = create_test_config();
    let stale_secs = config.playback.heartbeat_stale_secs;
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool.clone());

    let (user_id, episode_id) = setup_licensed_user(&state, &pool).await;

    const LIMIT: i64 = 3;
    const ATTEMPTS: usize = 8;

    // 8 个不同设备同时抢 3 个名额
    let mut handles = Vec::new();
    for i in 0..ATTEMPTS {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            state
                .session_service
                .admit(
                    AdmitParams {
                        user_id,
                        episode_id,
                        device: &device(&format!("device-{}", i)),
                        max_concurrent_streams: LIMIT,
                    },
                    &test_client(),
                )
                .await
        }));
    }

    let results = futures::future::join_all(handles).await;

    let mut admitted = 0;
    let mut blocked = 0;
    for result in results {
        match result.unwrap() {
            Ok(_) => admitted += 1,
            Err(AppError::ConcurrencyLimitExceeded { .. }) => blocked += 1,
            Err(e) => panic!("unexpected admission error: {}", e),
        }
    }

    // 恰好 LIMIT 个成功，其余全部拒绝
    assert_eq!(admitted, LIMIT as usize);
    assert_eq!(blocked, ATTEMPTS - LIMIT as usize);

    let repo = StreamRepository::new(pool.clone());
    assert_eq!(
        repo.count_live_streams(user_id, stale_secs).await.unwrap(),
        LIMIT
    );

    // 审计与结果一一对应
    assert_eq!(
        count_events(&state, user_id, AuditEventType::PlaybackStarted).await,
        LIMIT
    );
    assert_eq!(
        count_events(&state, user_id, AuditEventType::ConcurrentStreamBlocked).await,
        (ATTEMPTS - LIMIT as usize) as i64
    );
}

#[tokio::test]
#[serial]
async fn test_heartbeat_refreshes_session() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool.clone());

    let (user_id, episode_id) = setup_licensed_user(&state, &pool).await;

    let stream = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-a"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await
        .unwrap();

    // 回拨心跳后续约，last_heartbeat 前移
    age_stream_heartbeat(&pool, &stream.session_token, 30).await;
    state
        .session_service
        .heartbeat(&stream.session_token)
        .await
        .unwrap();

    let repo = StreamRepository::new(pool.clone());
    let refreshed = repo
        .find_by_device(user_id, "device-a")
        .await
        .unwrap()
        .unwrap();
    assert!(refreshed.last_heartbeat > stream.last_heartbeat - chrono::Duration::seconds(5));

    // 未知令牌
    let result = state.session_service.heartbeat("no-such-token").await;
    assert!(matches!(result, Err(AppError::SessionNotFound)));
}

#[tokio::test]
#[serial]
async fn test_end_is_idempotent() {
    let config = create_test_config();
    let pool = setup_test_db(&config).await;
    let state = create_test_app_state(config, pool.clone());

    let (user_id, episode_id) = setup_licensed_user(&state, &pool).await;

    let stream = state
        .session_service
        .admit(
            AdmitParams {
                user_id,
                episode_id,
                device: &device("device-a"),
                max_concurrent_streams: 2,
            },
            &test_client(),
        )
        .await
        .unwrap();

    state
        .session_service
        .end(&stream.session_token, "ended by client", &test_client())
        .await
        .unwrap();

    // 再次结束同一令牌：视为已结束，不报错也不再发事件
    state
        .session_service
        .end(&stream.session_token, "ended by client", &test_client())
        .await
        .unwrap();

    assert_eq!(count_events(&state, user_id, AuditEventType::PlaybackEnded).await, 1);
    assert!(state
        .session_service
        .list_sessions(user_id)
        .await
        .unwrap()
        .is_empty());
}
