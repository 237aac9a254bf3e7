//! 应用访问令牌
//!
//! 应用渠道的令牌有两种来源：
//!
//! - 调用方提供的 `TokenResolver`，每次发送都直接调用，不做缓存
//! - `app_id` / `app_secret`，调用开放平台签发接口获取，并按有效期缓存
//!
//! 同一应用的令牌同时失效时，多个 worker 可能各自刷新一次，结果相同，不做合并。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use notify_shared::cache::{CacheKey, ExpiringCache};
use notify_shared::observability::metrics::{record_token_cache_hit, record_token_issued};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::error::LarkError;
use crate::request::{ApiRequest, RequestExecutor};
use crate::target::AppTarget;

/// 令牌提前失效的秒数，避免使用即将过期的令牌
const EXPIRY_MARGIN_SECS: u64 = 100;

/// 自定义令牌获取方式
///
/// 任何 `Fn() -> Result<String, LarkError> + Send + Sync` 闭包都可直接使用。
#[async_trait]
pub trait TokenResolver: Send + Sync {
    async fn resolve(&self) -> Result<String, LarkError>;
}

#[async_trait]
impl<F> TokenResolver for F
where
    F: Fn() -> Result<String, LarkError> + Send + Sync,
{
    async fn resolve(&self) -> Result<String, LarkError> {
        self()
    }
}

/// 应用凭证
#[derive(Clone)]
pub enum Credential {
    Resolver(Arc<dyn TokenResolver>),
    Secret { app_id: String, app_secret: String },
}

impl Credential {
    pub fn resolver(resolver: impl TokenResolver + 'static) -> Self {
        Self::Resolver(Arc::new(resolver))
    }

    pub fn secret(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self::Secret {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolver(_) => f.write_str("Resolver(..)"),
            Self::Secret { app_id, .. } => f
                .debug_struct("Secret")
                .field("app_id", app_id)
                .field("app_secret", &"[REDACTED]")
                .finish(),
        }
    }
}

/// 令牌签发接口响应
#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    app_access_token: String,
    /// 有效期（秒）
    #[serde(default)]
    expire: i64,
}

/// 令牌提供者
pub struct CredentialProvider {
    executor: RequestExecutor,
    cache: Arc<ExpiringCache>,
    max_retries: u32,
}

impl CredentialProvider {
    pub fn new(executor: RequestExecutor, cache: Arc<ExpiringCache>, max_retries: u32) -> Self {
        Self {
            executor,
            cache,
            max_retries,
        }
    }

    /// 获取应用的访问令牌
    #[instrument(skip_all, fields(app = %app.name))]
    pub async fn resolve(&self, app: &AppTarget) -> Result<String, LarkError> {
        match &app.credential {
            Credential::Resolver(resolver) => resolver.resolve().await,
            Credential::Secret { app_id, app_secret } => {
                let key = CacheKey::lark_token(app_id);
                if let Ok(token) = self.cache.get(&key) {
                    debug!("命中令牌缓存");
                    record_token_cache_hit(&app.name);
                    return Ok(token);
                }

                self.issue(app, app_id, app_secret, &key).await
            }
        }
    }

    async fn issue(
        &self,
        app: &AppTarget,
        app_id: &str,
        app_secret: &str,
        cache_key: &str,
    ) -> Result<String, LarkError> {
        let request = ApiRequest::post_json(
            app.app_type.token_url(),
            json!({ "app_id": app_id, "app_secret": app_secret }),
        );

        let response = self.executor.execute(&request, self.max_retries).await?;
        let body: TokenResponse = response.json()?;
        if body.code != 0 {
            return Err(LarkError::TokenIssuance {
                app: app.name.clone(),
                message: body.msg,
            });
        }

        record_token_issued(&app.name);

        let ttl = u64::try_from(body.expire)
            .unwrap_or_default()
            .saturating_sub(EXPIRY_MARGIN_SECS);
        if ttl > 0 {
            self.cache.set(cache_key, body.app_access_token.clone(), ttl);
            info!(ttl_secs = ttl, "应用令牌已签发并缓存");
        } else {
            // 有效期过短时不缓存，否则会被当作永不过期
            warn!(expire = body.expire, "令牌有效期过短，不写入缓存");
        }

        Ok(body.app_access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ApiResponse, MockHttpTransport};
    use crate::target::AppType;
    use std::time::Duration;

    fn secret_app() -> AppTarget {
        AppTarget {
            name: "alert_app".to_string(),
            app_type: AppType::Feishu,
            credential: Credential::secret("cli_123", "s3cr3t"),
        }
    }

    fn token_response(token: &str, expire: i64) -> ApiResponse {
        ApiResponse::new(
            200,
            json!({"code": 0, "msg": "ok", "app_access_token": token, "expire": expire}).to_string(),
        )
    }

    fn provider(transport: MockHttpTransport) -> CredentialProvider {
        CredentialProvider::new(
            RequestExecutor::new(Arc::new(transport)),
            Arc::new(ExpiringCache::new()),
            3,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_cached_until_margin() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .withf(|request| {
                request.url == "https://open.feishu.cn/open-apis/auth/v3/app_access_token/internal/"
                    && request.body
                        == Some(json!({"app_id": "cli_123", "app_secret": "s3cr3t"}))
            })
            .times(2)
            .returning(|_| Ok(token_response("t-abc", 300)));

        let provider = provider(transport);
        let app = secret_app();

        assert_eq!(provider.resolve(&app).await.unwrap(), "t-abc");
        // 有效期内不重新签发
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(provider.resolve(&app).await.unwrap(), "t-abc");
        // expire - 100 = 200 秒后重新签发
        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(provider.resolve(&app).await.unwrap(), "t-abc");
    }

    #[tokio::test]
    async fn test_issuance_business_error() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Ok(ApiResponse::new(
                200,
                r#"{"code":10003,"msg":"invalid app_secret"}"#,
            ))
        });

        let result = provider(transport).resolve(&secret_app()).await;
        match result {
            Err(LarkError::TokenIssuance { app, message }) => {
                assert_eq!(app, "alert_app");
                assert_eq!(message, "invalid app_secret");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_short_expiry_not_cached() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(2)
            .returning(|_| Ok(token_response("t-short", 60)));

        let provider = provider(transport);
        let app = secret_app();
        provider.resolve(&app).await.unwrap();
        provider.resolve(&app).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_expiry_cached_without_overflow() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(|_| Ok(token_response("t-forever", i64::MAX)));

        let provider = provider(transport);
        let app = secret_app();

        assert_eq!(provider.resolve(&app).await.unwrap(), "t-forever");
        tokio::time::advance(Duration::from_secs(30 * 24 * 3600)).await;
        assert_eq!(provider.resolve(&app).await.unwrap(), "t-forever");
    }

    #[tokio::test]
    async fn test_custom_resolver_bypasses_network() {
        let mut transport = MockHttpTransport::new();
        transport.expect_send().never();

        let app = AppTarget {
            name: "custom".to_string(),
            app_type: AppType::Lark,
            credential: Credential::resolver(|| Ok::<_, LarkError>("t-custom".to_string())),
        };

        let provider = provider(transport);
        assert_eq!(provider.resolve(&app).await.unwrap(), "t-custom");
        assert_eq!(provider.resolve(&app).await.unwrap(), "t-custom");
    }

    #[tokio::test]
    async fn test_custom_resolver_error_propagates() {
        let app = AppTarget {
            name: "custom".to_string(),
            app_type: AppType::Lark,
            credential: Credential::resolver(|| {
                Err::<String, _>(LarkError::TokenIssuance {
                    app: "custom".to_string(),
                    message: "vault unavailable".to_string(),
                })
            }),
        };

        let result = provider(MockHttpTransport::new()).resolve(&app).await;
        assert!(matches!(result, Err(LarkError::TokenIssuance { .. })));
    }

    #[test]
    fn test_credential_debug_redacts_secret() {
        let debug = format!("{:?}", Credential::secret("cli_123", "s3cr3t"));
        assert!(debug.contains("cli_123"));
        assert!(!debug.contains("s3cr3t"));
    }
}
