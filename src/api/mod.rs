pub mod endpoint;
pub mod response;

use crate::diagnostics::Diagnostics;
use crate::error::Error;
use crate::model;
use crate::retry::{execute_once, retry, Request, RetryPolicy};
use chrono::NaiveDate;
use endpoint::EndpointKind;
use futures::future::join_all;
use reqwest::Client;
use response::{Envelope, TokenResponse};
use serde_json::{json, Value};

pub fn api(api_url: String, username: String, password: String) -> model::Api {
    model::Api {
        api_url,
        username,
        password,
        auth_retry: RetryPolicy::AUTH,
        data_retry: RetryPolicy::DATA,
    }
}

/// Obtain a fresh bearer token.
///
/// Transport failures, unreadable bodies and responses without `success: true` and a non-empty
/// token all count as a failed attempt against `api.auth_retry`.
pub async fn acquire_credential(
    api: &model::Api,
    client: &Client,
) -> Result<model::Credential, Error> {
    log::info!("Getting bearer token from solar service provider's API.");

    let url = format!("{}{}", api.api_url, endpoint::TOKEN);
    let body = json!({
        "areaCode": "sunsynk",
        "client_id": "csp-web",
        "grant_type": "password",
        "password": api.password,
        "source": "sunsynk",
        "username": api.username,
    });
    let request = Request::post(url, body).require_body();
    let request = &request;

    let credential = retry(&api.auth_retry, "Token request", move |_| async move {
        let response = execute_once(client, request).await?;
        let token: TokenResponse = serde_json::from_str(&response.body)
            .map_err(|e| Error::InvalidResponse(format!("token response: {}", e)))?;

        match token.token() {
            Some(token) => Ok(model::Credential {
                token: token.to_owned(),
            }),
            None => Err(Error::AuthFailure(format!(
                "Invalid token received: {}",
                token.message()
            ))),
        }
    })
    .await
    .map_err(|e| match e {
        Error::AuthFailure(_) => e,
        other => Error::AuthFailure(other.to_string()),
    })?;

    log::info!(
        "Valid token retrieved. Bearer token length: {}",
        credential.token.len()
    );
    Ok(credential)
}

pub async fn login(api: &model::Api, client: &Client) -> Result<model::LoggedInApi, Error> {
    acquire_credential(api, client)
        .await
        .map(|credential| model::LoggedInApi {
            api_url: api.api_url.to_owned(),
            credential,
            client: client.clone(),
            auth_retry: api.auth_retry,
            data_retry: api.data_retry,
        })
}

/// Fetch one document. A body with `success: false` or without `data` is a failed attempt like
/// any transport error.
pub async fn fetch_document(
    api: &model::LoggedInApi,
    device: &model::Device,
    kind: EndpointKind,
    date: NaiveDate,
) -> Result<Value, Error> {
    let url = format!("{}{}", api.api_url, kind.path(&device.serial, date));
    let request = Request::get(url)
        .bearer(&api.credential.token)
        .require_body();
    let request = &request;
    let client = &api.client;
    let what = format!("{} {} request", device, kind);

    retry(&api.data_retry, &what, move |_| async move {
        let document = execute_once(client, request).await?.json()?;
        let envelope = Envelope::new(&document);
        if envelope.is_failure() {
            return Err(Error::FetchFailure {
                endpoint: kind.to_string(),
                reason: envelope.message(),
            });
        }
        if !envelope.has_data() {
            return Err(Error::FetchFailure {
                endpoint: kind.to_string(),
                reason: "response carries no data".to_string(),
            });
        }
        Ok(document)
    })
    .await
    .map_err(|e| match e {
        Error::FetchFailure { .. } => e,
        other => Error::FetchFailure {
            endpoint: kind.to_string(),
            reason: other.to_string(),
        },
    })
}

/// Fetch every document for `device`, concurrently. Endpoint failures leave their slot empty;
/// the flag is true only when all documents arrived.
pub async fn fetch(
    api: &model::LoggedInApi,
    device: &model::Device,
    date: NaiveDate,
    diagnostics: &Diagnostics,
) -> (model::Bundle, bool) {
    let results = join_all(
        EndpointKind::ALL
            .iter()
            .map(|kind| fetch_document(api, device, *kind, date)),
    )
    .await;

    let mut bundle = model::Bundle::default();
    for (kind, result) in EndpointKind::ALL.iter().zip(results) {
        match result {
            Ok(document) => {
                diagnostics.record(&format!("{}_{}", device, kind), &document);
                bundle.insert(*kind, document);
            }
            Err(e) => log::warn!("Device {}: {}", device, e),
        }
    }

    let complete = bundle.present() == EndpointKind::COUNT;
    if !complete {
        let missing: Vec<&str> = bundle.missing().into_iter().map(EndpointKind::name).collect();
        log::warn!(
            "Device {}: degraded fetch, missing {}",
            device,
            missing.join(", ")
        );
    }

    (bundle, complete)
}

/// Push a settings document to the inverter. Requires an explicit `success: true` in the reply.
pub async fn write_settings(
    api: &model::LoggedInApi,
    device: &model::Device,
    settings: &Value,
) -> Result<(), Error> {
    if !settings.is_object() {
        return Err(Error::ConfigError(
            "inverter settings must be a JSON object".to_string(),
        ));
    }

    log::info!("Sending settings to inverter {}", device);
    log::debug!("Settings data: {}", settings);

    let url = format!("{}{}", api.api_url, endpoint::settings_write(&device.serial));
    let request = Request::post(url, settings.clone())
        .bearer(&api.credential.token)
        .require_body();
    let request = &request;
    let client = &api.client;

    retry(&api.auth_retry, "Settings update", move |_| async move {
        let reply = execute_once(client, request).await?.json()?;
        match reply.get("success").and_then(Value::as_bool) {
            Some(true) => Ok(()),
            _ => Err(Error::RequestFailure(format!(
                "Failed to update inverter settings: {}",
                Envelope::new(&reply).message()
            ))),
        }
    })
    .await?;

    log::info!("Successfully updated inverter settings");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::{fast_api, logged_in, mock_device, read_resource, test_date};
    use mockito::{Matcher, Server};
    use std::time::Instant;

    #[tokio::test]
    async fn acquire_credential_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_body(Matcher::PartialJson(json!({
                "client_id": "csp-web",
                "grant_type": "password",
                "username": "user@example.com",
                "password": "secret",
            })))
            .with_status(200)
            .with_body(read_resource("token.json"))
            .expect(1)
            .create_async()
            .await;

        let credential = acquire_credential(&fast_api(&server.url()), &Client::new())
            .await
            .unwrap();

        assert_eq!("test-access-token", credential.token);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failing_auth_is_tried_exactly_three_times() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let api = fast_api(&server.url());
        let started = Instant::now();
        let result = acquire_credential(&api, &Client::new()).await;

        assert!(matches!(result, Err(Error::AuthFailure(_))));
        assert!(started.elapsed() >= api.auth_retry.delay * 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_credentials_are_retried_and_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_body(read_resource("token_failed.json"))
            .expect(3)
            .create_async()
            .await;

        let result = acquire_credential(&fast_api(&server.url()), &Client::new()).await;

        match result {
            Err(Error::AuthFailure(msg)) => assert!(msg.contains("Incorrect username or password")),
            other => panic!("unexpected {:?}", other),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn full_fetch() {
        let mut server = Server::new_async().await;
        let device = model::Device::new("123456");
        let mocks = mock_device(&mut server, &device, &[]).await;

        let api = logged_in(&server.url());
        let (bundle, complete) = fetch(&api, &device, test_date(), &Diagnostics::disabled()).await;

        assert!(complete);
        assert_eq!(EndpointKind::COUNT, bundle.present());
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn partial_fetch_keeps_other_documents() {
        let mut server = Server::new_async().await;
        let device = model::Device::new("123456");
        let _mocks = mock_device(&mut server, &device, &[EndpointKind::Load]).await;
        let load = server
            .mock("GET", Matcher::Regex("^/api/v1/inverter/load/".to_string()))
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let api = logged_in(&server.url());
        let (bundle, complete) = fetch(&api, &device, test_date(), &Diagnostics::disabled()).await;

        assert!(!complete);
        assert!(bundle.get(EndpointKind::Load).is_none());
        assert_eq!(EndpointKind::COUNT - 1, bundle.present());
        load.assert_async().await;
    }

    #[tokio::test]
    async fn unsuccessful_envelope_is_a_fetch_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v1/inverter/123456/realtime/input")
            .with_status(200)
            .with_body(r#"{"code":1,"msg":"no permission","data":null,"success":false}"#)
            .expect(3)
            .create_async()
            .await;

        let api = logged_in(&server.url());
        let result = fetch_document(
            &api,
            &model::Device::new("123456"),
            EndpointKind::Input,
            test_date(),
        )
        .await;

        match result {
            Err(Error::FetchFailure { endpoint, reason }) => {
                assert_eq!("input", endpoint);
                assert_eq!("no permission", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn write_settings_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/common/setting/123456/set")
            .match_header("authorization", "Bearer test-access-token")
            .match_body(Matcher::Json(json!({"sellTime1": "00:00", "cap1": "30"})))
            .with_status(200)
            .with_body(r#"{"code":0,"msg":"Success","success":true}"#)
            .expect(1)
            .create_async()
            .await;

        let api = logged_in(&server.url());
        let result = write_settings(
            &api,
            &model::Device::new("123456"),
            &json!({"sellTime1": "00:00", "cap1": "30"}),
        )
        .await;

        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn write_settings_rejected() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/common/setting/123456/set")
            .with_status(200)
            .with_body(r#"{"code":500,"msg":"Parameter error","success":false}"#)
            .expect(3)
            .create_async()
            .await;

        let api = logged_in(&server.url());
        let result = write_settings(&api, &model::Device::new("123456"), &json!({"cap1": "x"})).await;

        assert!(matches!(result, Err(Error::RequestFailure(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn write_settings_requires_object() {
        let api = logged_in("http://127.0.0.1:9");
        let result = write_settings(&api, &model::Device::new("123456"), &json!([1, 2])).await;
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }
}
