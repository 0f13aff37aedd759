//! Token cache refresh and serialization tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use imbridge::token::{expiry_from_ttl, IssuedToken, Token, TokenCache};
use imbridge::{ImError, Provider};

fn issued(value: &str, ttl_secs: i64) -> IssuedToken {
    IssuedToken {
        value: value.to_owned(),
        ttl_secs,
    }
}

#[tokio::test]
async fn valid_token_is_reused() {
    let cache = TokenCache::new(Provider::WeCom);
    cache
        .store(Token::new("cached", expiry_from_ttl(Utc::now(), 3600)))
        .await;

    let calls = AtomicUsize::new(0);
    let value = cache
        .get_or_refresh(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(issued("fresh", 7200))
        })
        .await;
    assert_eq!(value.ok().as_deref(), Some("cached"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_is_replaced() {
    let cache = TokenCache::new(Provider::DingTalk);
    cache
        .store(Token::new("stale", expiry_from_ttl(Utc::now(), 0)))
        .await;

    let before = Utc::now();
    let value = cache
        .get_or_refresh(|| async { Ok(issued("fresh", 7200)) })
        .await;
    assert_eq!(value.ok().as_deref(), Some("fresh"));

    let stored = match cache.current().await {
        Some(token) => token,
        None => panic!("refreshed token should be stored"),
    };
    let lifetime = stored.expires_at().signed_duration_since(before).num_seconds();
    assert!((7139..=7141).contains(&lifetime), "lifetime was {lifetime}");
}

#[tokio::test]
async fn failed_refresh_leaves_cache_untouched() {
    let cache = TokenCache::new(Provider::Feishu);
    let result = cache
        .get_or_refresh(|| async {
            Err(ImError::Auth {
                provider: Provider::Feishu,
                code: 99991663,
                message: "app ticket invalid".to_owned(),
            })
        })
        .await;
    assert!(matches!(result, Err(ImError::Auth { .. })));
    assert!(cache.current().await.is_none());
}

#[tokio::test]
async fn cleared_cache_refreshes_again() {
    let cache = TokenCache::new(Provider::WeCom);
    let first = cache.get_or_refresh(|| async { Ok(issued("one", 7200)) }).await;
    assert_eq!(first.ok().as_deref(), Some("one"));

    cache.clear().await;
    let second = cache.get_or_refresh(|| async { Ok(issued("two", 7200)) }).await;
    assert_eq!(second.ok().as_deref(), Some("two"));
}

#[tokio::test]
async fn concurrent_misses_refresh_once() {
    let cache = Arc::new(TokenCache::new(Provider::WeCom));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_refresh(|| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(issued("shared", 7200))
                })
                .await
        }));
    }

    for handle in handles {
        let value = match handle.await {
            Ok(value) => value,
            Err(err) => panic!("task should not panic: {err}"),
        };
        assert_eq!(value.ok().as_deref(), Some("shared"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
