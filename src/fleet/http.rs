//! HTTP implementation of the fleet API contract.
//!
//! Speaks JSON over HTTP to the fleet's machines API. Authentication uses a
//! bearer token supplied via configuration; acquiring the token is out of
//! scope. The client is scoped to a single application.

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::{AppSummary, FleetApi, FleetError, FleetFuture, LaunchRequest, Machine, MachineState};
use crate::config::ConsoleConfig;

/// Extra slack added to the HTTP request timeout on blocking wait calls so
/// the server-side deadline fires first.
const WAIT_SLACK: Duration = Duration::from_secs(2);

/// Fleet API client backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpFleetClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    app: String,
}

impl HttpFleetClient {
    /// Builds a client from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Transport`] when the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: &ConsoleConfig) -> Result<Self, FleetError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| FleetError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            token: config.api_token.clone(),
            app: config.app.clone(),
        })
    }

    fn machines_url(&self, suffix: &str) -> String {
        format!("{}/v1/apps/{}/machines{suffix}", self.base_url, self.app)
    }

    fn transport_error(err: &reqwest::Error) -> FleetError {
        FleetError::Transport {
            message: err.to_string(),
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        resource: &str,
    ) -> Result<T, FleetError> {
        let response = Self::check_status(response, resource).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| FleetError::Decode {
                message: err.to_string(),
            })
    }

    async fn acknowledge(response: reqwest::Response, resource: &str) -> Result<(), FleetError> {
        Self::check_status(response, resource).await.map(|_| ())
    }

    async fn check_status(
        response: reqwest::Response,
        resource: &str,
    ) -> Result<reqwest::Response, FleetError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FleetError::NotFound {
                resource: resource.to_owned(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FleetError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn fetch_app(&self, name: &str) -> Result<AppSummary, FleetError> {
        let url = format!("{}/v1/apps/{name}", self.base_url);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        Self::decode(response, &format!("app {name}")).await
    }

    async fn launch(&self, launch: &LaunchRequest) -> Result<Machine, FleetError> {
        let response = self
            .http
            .post(self.machines_url(""))
            .bearer_auth(&self.token)
            .json(launch)
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        Self::decode(response, &format!("app {}", self.app)).await
    }

    async fn fetch_machine(&self, machine_id: &str) -> Result<Machine, FleetError> {
        let response = self
            .http
            .get(self.machines_url(&format!("/{machine_id}")))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        Self::decode(response, &format!("machine {machine_id}")).await
    }

    async fn fetch_active(&self) -> Result<Vec<Machine>, FleetError> {
        let response = self
            .http
            .get(self.machines_url(""))
            .bearer_auth(&self.token)
            .query(&[("state", "active")])
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        Self::decode(response, &format!("app {}", self.app)).await
    }

    async fn request_stop(&self, machine_id: &str, timeout: Duration) -> Result<(), FleetError> {
        let response = self
            .http
            .post(self.machines_url(&format!("/{machine_id}/stop")))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "timeout": timeout.as_secs() }))
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        Self::acknowledge(response, &format!("machine {machine_id}")).await
    }

    async fn wait(
        &self,
        machine_id: &str,
        state: MachineState,
        timeout: Duration,
    ) -> Result<(), FleetError> {
        let secs = timeout.as_secs();
        let timeout_error = FleetError::WaitTimeout {
            machine_id: machine_id.to_owned(),
            state,
            secs,
        };
        let response = self
            .http
            .get(self.machines_url(&format!("/{machine_id}/wait")))
            .bearer_auth(&self.token)
            .query(&[("state", state.as_str()), ("timeout", &secs.to_string())])
            .timeout(timeout + WAIT_SLACK)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    timeout_error.clone()
                } else {
                    Self::transport_error(&err)
                }
            })?;
        if response.status() == reqwest::StatusCode::REQUEST_TIMEOUT {
            return Err(timeout_error);
        }
        Self::acknowledge(response, &format!("machine {machine_id}")).await
    }
}

impl FleetApi for HttpFleetClient {
    fn get_app<'a>(&'a self, name: &'a str) -> FleetFuture<'a, AppSummary> {
        Box::pin(self.fetch_app(name))
    }

    fn create_machine<'a>(&'a self, launch: &'a LaunchRequest) -> FleetFuture<'a, Machine> {
        Box::pin(self.launch(launch))
    }

    fn get_machine<'a>(&'a self, machine_id: &'a str) -> FleetFuture<'a, Machine> {
        Box::pin(self.fetch_machine(machine_id))
    }

    fn list_active(&self) -> FleetFuture<'_, Vec<Machine>> {
        Box::pin(self.fetch_active())
    }

    fn stop_machine<'a>(&'a self, machine_id: &'a str, timeout: Duration) -> FleetFuture<'a, ()> {
        Box::pin(self.request_stop(machine_id, timeout))
    }

    fn wait_for_state<'a>(
        &'a self,
        machine_id: &'a str,
        state: MachineState,
        timeout: Duration,
    ) -> FleetFuture<'a, ()> {
        Box::pin(self.wait(machine_id, state, timeout))
    }
}
