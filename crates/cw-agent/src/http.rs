use std::time::Duration;

use cw_core::config::AgentConfig;
use cw_core::types::{
    Account, ChoreConfig, ChoreInstance, CollectMaturitySettings, DistributionList,
    DistributionListDef, TimestampNanos,
};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::{AgentError, ChoreAgent, Result};
use crate::wire::{
    WireAccount, WireChoreConfig, WireChoreStatus, WireDistributionList, WireDistributionListDef,
    WireMaturitySettings,
};

/// Agent that relays calls to a JSON gateway.
///
/// Each call is `POST {gateway}/api/canisters/{canister}/call/{method}` with
/// the arguments as a JSON array. A reply of `{"Err": ...}` or a non-2xx
/// status is a rejection; `{"Ok": value}` is unwrapped.
#[derive(Debug, Clone)]
pub struct HttpChoreAgent {
    client: reqwest::Client,
    gateway_url: String,
    canister_id: String,
}

impl HttpChoreAgent {
    pub fn new(
        gateway_url: impl Into<String>,
        canister_id: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let canister_id = canister_id.into();
        if canister_id.trim().is_empty() {
            return Err(AgentError::Config("canister id is empty".into()));
        }
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(Self {
            client,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            canister_id,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let canister = config.canister_id.as_deref().ok_or_else(|| {
            AgentError::Config(
                "no canister id; set agent.canister_id, CHOREWRIGHT_CANISTER or --canister".into(),
            )
        })?;
        Self::new(&config.gateway_url, canister, config.request_timeout())
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/api/canisters/{}/call/{}",
            self.gateway_url, self.canister_id, method
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        debug!(method, canister = %self.canister_id, "agent call");
        let resp = self
            .client
            .post(self.method_url(method))
            .json(&args)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;
        let value: Value = if body.trim().is_empty() {
            Value::Null
        } else if status.is_success() {
            serde_json::from_str(&body).map_err(|e| AgentError::Decode {
                method: method.to_string(),
                message: e.to_string(),
            })?
        } else {
            serde_json::from_str(&body).unwrap_or(Value::String(body.clone()))
        };

        if !status.is_success() {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| value.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(AgentError::rejected(method, message));
        }

        let value = unwrap_result(method, value)?;
        serde_json::from_value(value).map_err(|e| AgentError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    async fn call_unit(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.call::<IgnoredAny>(method, args).await.map(|_| ())
    }

    fn transport_error(&self, err: reqwest::Error) -> AgentError {
        if err.is_connect() {
            AgentError::Transport(format!(
                "could not connect to gateway at {}; is it running?",
                self.gateway_url
            ))
        } else if err.is_timeout() {
            AgentError::Transport("request timed out".into())
        } else {
            AgentError::Transport(err.to_string())
        }
    }
}

/// Strip a `{"Ok": v}` wrapper or turn `{"Err": e}` into a rejection.
fn unwrap_result(method: &str, value: Value) -> Result<Value> {
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("Err") => {
            let err = map.remove("Err").unwrap_or(Value::Null);
            let message = match err {
                Value::String(s) => s,
                other => other.to_string(),
            };
            Err(AgentError::rejected(method, message))
        }
        Value::Object(mut map) if map.len() == 1 && map.contains_key("Ok") => {
            Ok(map.remove("Ok").unwrap_or(Value::Null))
        }
        other => Ok(other),
    }
}

fn decode_error(method: &str, err: impl ToString) -> AgentError {
    AgentError::Decode {
        method: method.to_string(),
        message: err.to_string(),
    }
}

fn opt_arg<T: serde::Serialize>(value: Option<T>) -> Value {
    match value {
        Some(v) => json!([v]),
        None => json!([]),
    }
}

#[async_trait::async_trait]
impl ChoreAgent for HttpChoreAgent {
    fn canister_id(&self) -> &str {
        &self.canister_id
    }

    async fn get_chore_statuses(&self) -> Result<Vec<ChoreInstance>> {
        let raw: Vec<WireChoreStatus> = self.call("get_chore_statuses", vec![]).await?;
        Ok(raw.into_iter().map(ChoreInstance::from).collect())
    }

    async fn get_chore_configs(&self) -> Result<Vec<(String, ChoreConfig)>> {
        let raw: Vec<(String, WireChoreConfig)> = self.call("get_chore_configs", vec![]).await?;
        Ok(raw
            .into_iter()
            .map(|(id, cfg)| (id, ChoreConfig::from(cfg)))
            .collect())
    }

    async fn start_chore(&self, chore_id: &str) -> Result<()> {
        self.call_unit("start_chore", vec![json!(chore_id)]).await
    }

    async fn stop_chore(&self, chore_id: &str) -> Result<()> {
        self.call_unit("stop_chore", vec![json!(chore_id)]).await
    }

    async fn pause_chore(&self, chore_id: &str) -> Result<()> {
        self.call_unit("pause_chore", vec![json!(chore_id)]).await
    }

    async fn resume_chore(&self, chore_id: &str) -> Result<()> {
        self.call_unit("resume_chore", vec![json!(chore_id)]).await
    }

    async fn trigger_chore(&self, chore_id: &str) -> Result<()> {
        self.call_unit("trigger_chore", vec![json!(chore_id)]).await
    }

    async fn schedule_start_chore(&self, chore_id: &str, at: TimestampNanos) -> Result<()> {
        self.call_unit("schedule_start_chore", vec![json!(chore_id), json!(at)])
            .await
    }

    async fn set_chore_next_run(&self, chore_id: &str, at: TimestampNanos) -> Result<()> {
        self.call_unit("set_chore_next_run", vec![json!(chore_id), json!(at)])
            .await
    }

    async fn set_chore_interval(&self, chore_id: &str, seconds: u64) -> Result<()> {
        self.call_unit("set_chore_interval", vec![json!(chore_id), json!(seconds)])
            .await
    }

    async fn set_chore_max_interval(&self, chore_id: &str, seconds: Option<u64>) -> Result<()> {
        self.call_unit(
            "set_chore_max_interval",
            vec![json!(chore_id), opt_arg(seconds)],
        )
        .await
    }

    async fn create_chore_instance(
        &self,
        chore_type_id: &str,
        instance_id: &str,
        label: &str,
    ) -> Result<bool> {
        self.call(
            "create_chore_instance",
            vec![json!(chore_type_id), json!(instance_id), json!(label)],
        )
        .await
    }

    async fn rename_chore_instance(&self, chore_id: &str, label: &str) -> Result<()> {
        self.call_unit("rename_chore_instance", vec![json!(chore_id), json!(label)])
            .await
    }

    async fn delete_chore_instance(&self, chore_id: &str) -> Result<bool> {
        self.call("delete_chore_instance", vec![json!(chore_id)])
            .await
    }

    async fn get_collect_maturity_settings(
        &self,
        chore_id: &str,
    ) -> Result<CollectMaturitySettings> {
        const METHOD: &str = "get_collect_maturity_settings";
        let raw: WireMaturitySettings = self.call(METHOD, vec![json!(chore_id)]).await?;
        CollectMaturitySettings::try_from(raw).map_err(|e| decode_error(METHOD, e))
    }

    async fn set_collect_maturity_threshold(
        &self,
        chore_id: &str,
        amount: Option<u64>,
    ) -> Result<()> {
        self.call_unit(
            "set_collect_maturity_threshold",
            vec![json!(chore_id), opt_arg(amount)],
        )
        .await
    }

    async fn set_collect_maturity_destination(
        &self,
        chore_id: &str,
        destination: Option<Account>,
    ) -> Result<()> {
        let wire = destination.as_ref().map(WireAccount::from);
        self.call_unit(
            "set_collect_maturity_destination",
            vec![json!(chore_id), opt_arg(wire)],
        )
        .await
    }

    async fn get_distribution_lists(&self, chore_id: &str) -> Result<Vec<DistributionList>> {
        const METHOD: &str = "get_distribution_lists";
        let raw: Vec<WireDistributionList> = self.call(METHOD, vec![json!(chore_id)]).await?;
        raw.into_iter()
            .map(|l| DistributionList::try_from(l).map_err(|e| decode_error(METHOD, e)))
            .collect()
    }

    async fn add_distribution_list(
        &self,
        chore_id: &str,
        def: &DistributionListDef,
    ) -> Result<u64> {
        let wire = WireDistributionListDef::from(def);
        self.call("add_distribution_list", vec![json!(chore_id), json!(wire)])
            .await
    }

    async fn update_distribution_list(
        &self,
        chore_id: &str,
        list_id: u64,
        def: &DistributionListDef,
    ) -> Result<()> {
        let wire = WireDistributionListDef::from(def);
        self.call_unit(
            "update_distribution_list",
            vec![json!(chore_id), json!(list_id), json!(wire)],
        )
        .await
    }

    async fn remove_distribution_list(&self, chore_id: &str, list_id: u64) -> Result<()> {
        self.call_unit(
            "remove_distribution_list",
            vec![json!(chore_id), json!(list_id)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_wrapper_is_stripped() {
        let v = unwrap_result("m", json!({"Ok": 7})).unwrap();
        assert_eq!(v, json!(7));
    }

    #[test]
    fn err_wrapper_is_a_rejection() {
        let err = unwrap_result("start_chore", json!({"Err": "not authorized"})).unwrap_err();
        assert_eq!(err, AgentError::rejected("start_chore", "not authorized"));
    }

    #[test]
    fn plain_objects_pass_through() {
        let v = json!({"Ok": 1, "extra": 2});
        assert_eq!(unwrap_result("m", v.clone()).unwrap(), v);
    }

    #[test]
    fn empty_canister_is_config_error() {
        let err = HttpChoreAgent::new("http://localhost", " ", None).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let agent = HttpChoreAgent::new("http://localhost:4943/", "aaaaa-aa", None).unwrap();
        assert_eq!(
            agent.method_url("start_chore"),
            "http://localhost:4943/api/canisters/aaaaa-aa/call/start_chore"
        );
    }
}
