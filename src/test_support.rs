//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, PoisonError};

use serde_json::{Value as Json, json};
use tokio::sync::{Mutex, MutexGuard};

use crate::builder::Params;
use crate::client::{Action, ApiError, ApiFuture, CloudApi};

/// Region reported by [`ScriptedApi`].
pub const SCRIPTED_REGION: &str = "cn-hangzhou";

/// Scripted cloud API that returns pre-seeded replies in FIFO order.
///
/// Used to drive deterministic call outcomes without touching the network.
/// Once the queue is empty every call fails with the non-retryable code
/// `Scripted.Exhausted`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedApi {
    responses: Arc<std::sync::Mutex<VecDeque<Result<Json, ApiError>>>>,
    invocations: Arc<std::sync::Mutex<Vec<Invocation>>>,
}

/// Records a single call made through [`ScriptedApi`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Invocation {
    /// Action name, for example `DescribeInstances`.
    pub action: String,
    /// Parameters sent.
    pub params: Params,
}

impl ScriptedApi {
    /// Creates an API with no queued replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful reply.
    pub fn push_ok(&self, body: Json) {
        self.push(Ok(body));
    }

    /// Queues a failed reply.
    pub fn push_err(&self, err: ApiError) {
        self.push(Err(err));
    }

    fn push(&self, reply: Result<Json, ApiError>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of replies not yet consumed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl CloudApi for ScriptedApi {
    fn region(&self) -> &str {
        SCRIPTED_REGION
    }

    fn call<'a>(&'a self, action: &'a Action, params: &'a Params) -> ApiFuture<'a> {
        self.invocations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Invocation {
                action: action.name.to_owned(),
                params: params.clone(),
            });
        let reply = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(ApiError::service(
                    "Scripted.Exhausted",
                    format!("no scripted reply for {}", action.name),
                ))
            });
        Box::pin(async move { reply })
    }
}

/// A `DescribeInstances` instance object with realistic nesting.
#[must_use]
pub fn instance_json(id: &str, name: &str, status: &str) -> Json {
    json!({
        "InstanceId": id,
        "InstanceName": name,
        "Status": status,
        "Description": "",
        "HostName": name,
        "InstanceType": "ecs.g6.large",
        "ImageId": "ubuntu_22_04_x64",
        "ZoneId": "cn-hangzhou-i",
        "RegionId": SCRIPTED_REGION,
        "Cpu": 2,
        "Memory": 8192,
        "InstanceChargeType": "PostPaid",
        "DeletionProtection": false,
        "InternetChargeType": "PayByTraffic",
        "InternetMaxBandwidthOut": 0,
        "CreationTime": "2026-01-01T00:00Z",
        "SecurityGroupIds": {"SecurityGroupId": ["sg-1"]},
        "VpcAttributes": {
            "VpcId": "vpc-1",
            "VSwitchId": "vsw-1",
            "PrivateIpAddress": {"IpAddress": ["172.16.0.10"]}
        },
        "PublicIpAddress": {"IpAddress": []},
        "InnerIpAddress": {"IpAddress": []},
        "EipAddress": {"IpAddress": ""},
        "Tags": {"Tag": []}
    })
}

/// Overrides top-level fields of `object`, for example
/// `with_fields(instance_json(..), json!({"Status": "Stopped"}))`.
#[must_use]
pub fn with_fields(mut object: Json, fields: Json) -> Json {
    if let (Some(target), Json::Object(fields)) = (object.as_object_mut(), fields) {
        target.extend(fields);
    }
    object
}

/// Wraps instance objects in a `DescribeInstances` page.
#[must_use]
pub fn instances_page(instances: &[Json]) -> Json {
    json!({
        "RequestId": "scripted",
        "TotalCount": instances.len(),
        "PageNumber": 1,
        "Instances": {"Instance": instances}
    })
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        Self::apply(pairs, &[]).await
    }

    /// Removes `keys` and sets `pairs` while holding the global mutex.
    pub async fn apply(pairs: &[(&str, &str)], removed: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs
                    .iter()
                    .map(|(key, _)| key)
                    .chain(removed)
                    .all(|key| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len() + removed.len());
        for key in removed {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }
        for (key, value) in pairs {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
