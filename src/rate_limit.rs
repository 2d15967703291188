//! Per-client request throttling. Each rule is a keyed GCRA bucket on the
//! peer address: `max` requests up front, refilled evenly over `window`.

use std::net::{IpAddr, Ipv4Addr};
use std::num::NonZeroU32;
use std::time::Duration;

use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
    web, Error,
};
use governor::{clock::Clock, DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use crate::error::ApiError;

type Limiter = DefaultKeyedRateLimiter<IpAddr>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Rule {
    Login,
    Register,
    Api,
}

impl Rule {
    fn message(self) -> &'static str {
        match self {
            Rule::Login => "Too many login attempts, please try again later",
            Rule::Register => "Too many registration attempts, please try again later",
            Rule::Api => "Too many requests, please try again later",
        }
    }
}

/// Allows `max` requests per `window` for each client.
pub fn window_quota(max: u32, window: Duration) -> Quota {
    let burst = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
    Quota::with_period(window / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

pub struct RateLimits {
    login: Limiter,
    register: Limiter,
    api: Limiter,
}

impl RateLimits {
    pub fn new(login: Quota, register: Quota, api: Quota) -> Self {
        RateLimits {
            login: RateLimiter::keyed(login),
            register: RateLimiter::keyed(register),
            api: RateLimiter::keyed(api),
        }
    }

    fn limiter(&self, rule: Rule) -> &Limiter {
        match rule {
            Rule::Login => &self.login,
            Rule::Register => &self.register,
            Rule::Api => &self.api,
        }
    }

    pub fn check(&self, rule: Rule, client: IpAddr) -> Result<(), ApiError> {
        let limiter = self.limiter(rule);
        limiter.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(limiter.clock().now());
            warn!("{rule:?} limit reached for {client}");
            ApiError::TooManyRequests {
                message: rule.message(),
                retry_after_secs: wait.as_secs().max(1),
            }
        })
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        let quarter_hour = Duration::from_secs(15 * 60);
        RateLimits::new(
            window_quota(5, quarter_hour),
            window_quota(3, Duration::from_secs(60 * 60)),
            window_quota(100, quarter_hour),
        )
    }
}

fn client_ip(request: &ServiceRequest) -> IpAddr {
    request
        .peer_addr()
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

async fn enforce<B: MessageBody + 'static>(
    request: ServiceRequest,
    next: Next<B>,
    rule: Rule,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let rejected = request
        .app_data::<web::Data<RateLimits>>()
        .and_then(|limits| limits.check(rule, client_ip(&request)).err());
    match rejected {
        Some(err) => Ok(request.error_response(err).map_into_right_body()),
        None => Ok(next.call(request).await?.map_into_left_body()),
    }
}

pub async fn limit_login(
    request: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    enforce(request, next, Rule::Login).await
}

pub async fn limit_register(
    request: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    enforce(request, next, Rule::Register).await
}

pub async fn limit_api(
    request: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    enforce(request, next, Rule::Api).await
}
