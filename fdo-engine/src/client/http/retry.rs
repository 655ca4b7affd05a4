// This file is part of Astarte.
//
// Copyright 2025, 2026 SECO Mind Srl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

//! Configure the retry for the client.

use std::future::Future;
use std::time::Duration;

use fdo_protocol::Error;
use http::header::RETRY_AFTER;
use http::status::StatusCode;
use pin_project_lite::pin_project;
use tracing::{info, warn};

use crate::time::{add_random_jitter, RETRY_DELAY};

use super::MESSAGE_TYPE_HEADER;

/// Upper bound for the delay requested by the server.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

// Retries with a delay.
#[derive(Debug, Clone)]
pub(crate) struct HttpRetry {
    count: u8,
    retries: u8,
    delay: Duration,
}

impl HttpRetry {
    pub(crate) fn new() -> Self {
        Self {
            retries: 3,
            count: 0,
            delay: RETRY_DELAY,
        }
    }

    fn should_retry_code(resp: &reqwest::Response) -> bool {
        Self::is_actual_internal_error(resp)
            || matches!(
                resp.status(),
                StatusCode::REQUEST_TIMEOUT
                    | StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            )
    }

    /// A 500 without the message type wasn't produced by the FDO server.
    fn is_actual_internal_error(resp: &reqwest::Response) -> bool {
        resp.status() == StatusCode::INTERNAL_SERVER_ERROR
            && !resp.headers().contains_key(MESSAGE_TYPE_HEADER)
    }

    /// Delay in seconds from the `Retry-After` header.
    fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
        let secs: u64 = resp.headers().get(RETRY_AFTER)?.to_str().ok()?.parse().ok()?;

        Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
    }

    pub(crate) fn retry(
        &mut self,
        result: &Result<reqwest::Response, Error>,
    ) -> Option<HttpRetryFuture> {
        let retry_after = match result {
            Ok(resp) if !Self::should_retry_code(resp) => {
                self.count = 0;

                return None;
            }
            Ok(resp) => Self::retry_after(resp),
            Err(_) => None,
        };

        if self.count >= self.retries {
            warn!("max retry reached");

            self.count = 0;

            return None;
        }

        self.count += 1;

        info!("retrying http request {}/{}", self.count, self.retries);

        let duration = retry_after.unwrap_or_else(|| add_random_jitter(self.delay));

        Some(HttpRetryFuture {
            timeout: tokio::time::sleep(duration),
        })
    }
}

pin_project! {
    pub(crate) struct HttpRetryFuture {
        #[pin]
        timeout: tokio::time::Sleep,
    }
}

impl Future for HttpRetryFuture {
    type Output = ();

    fn poll(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        let this = self.project();

        this.timeout.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use fdo_protocol::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    fn response(status: StatusCode, retry_after: Option<&'static str>) -> reqwest::Response {
        let mut builder = http::Response::builder().status(status);

        if let Some(value) = retry_after {
            builder = builder.header(RETRY_AFTER, value);
        }

        reqwest::Response::from(builder.body(Vec::<u8>::new()).unwrap())
    }

    #[tokio::test]
    async fn retries_transient_status() {
        let mut retry = HttpRetry {
            retries: 2,
            count: 0,
            delay: Duration::from_millis(100),
        };

        let resp = Ok(response(StatusCode::SERVICE_UNAVAILABLE, None));

        retry.retry(&resp).unwrap().await;
        retry.retry(&resp).unwrap().await;
        assert!(retry.retry(&resp).is_none());
        assert_eq!(retry.count, 0);
    }

    #[tokio::test]
    async fn io_errors_are_retried() {
        let mut retry = HttpRetry {
            retries: 1,
            count: 0,
            delay: Duration::from_millis(100),
        };

        let resp = Err(Error::new(ErrorKind::Io, "send HTTP request"));

        retry.retry(&resp).unwrap().await;
        assert!(retry.retry(&resp).is_none());
    }

    #[test]
    fn success_resets() {
        let mut retry = HttpRetry::new();
        retry.count = 2;

        assert!(retry.retry(&Ok(response(StatusCode::OK, None))).is_none());
        assert_eq!(retry.count, 0);
    }

    #[test]
    fn fdo_errors_are_not_retried() {
        let resp = http::Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .header(MESSAGE_TYPE_HEADER, "255")
            .body(Vec::<u8>::new())
            .unwrap();

        let resp = reqwest::Response::from(resp);

        assert!(!HttpRetry::should_retry_code(&resp));
        assert!(HttpRetry::should_retry_code(&response(
            StatusCode::INTERNAL_SERVER_ERROR,
            None
        )));
    }

    #[test]
    fn retry_after_is_bounded() {
        let resp = response(StatusCode::TOO_MANY_REQUESTS, Some("7"));
        assert_eq!(HttpRetry::retry_after(&resp), Some(Duration::from_secs(7)));

        let resp = response(StatusCode::TOO_MANY_REQUESTS, Some("86400"));
        assert_eq!(HttpRetry::retry_after(&resp), Some(MAX_RETRY_AFTER));

        let resp = response(StatusCode::TOO_MANY_REQUESTS, Some("soon"));
        assert_eq!(HttpRetry::retry_after(&resp), None);
    }
}
