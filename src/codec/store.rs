//! Certificate store shapes: properties, inventory schedule, and the store
//! and deployment codecs.

use crate::codec::{present, required, Codec, CodecError};
use crate::keyfactor::models::{
    AddToStoresRequest, CertificateLocation, CertificateStore, IntervalSchedule,
    InventorySchedule, JobSchedule, StorePassword, StoreRequest, StoreTarget, TimeSchedule,
    WeeklySchedule,
};
use crate::resources::deployment::{DeploymentState, StoreAssignment};
use crate::resources::store::StoreState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyScheduleConfig {
    pub days: Vec<String>,
    pub time: String,
}

/// Inventory schedule as configured. At most one field may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryScheduleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekly: Option<WeeklyScheduleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exactly_once_time: Option<String>,
}

pub fn expand_schedule(
    config: &InventoryScheduleConfig,
) -> Result<Option<InventorySchedule>, CodecError> {
    let mut set = Vec::new();
    if config.immediate == Some(true) {
        set.push("immediate");
    }
    if config.interval_minutes.is_some() {
        set.push("interval_minutes");
    }
    if present(&config.daily_time).is_some() {
        set.push("daily_time");
    }
    if config.weekly.is_some() {
        set.push("weekly");
    }
    if present(&config.exactly_once_time).is_some() {
        set.push("exactly_once_time");
    }
    if set.len() > 1 {
        return Err(CodecError::ConflictingSchedule(set.join(", ")));
    }

    let mut schedule = InventorySchedule::default();
    if config.immediate == Some(true) {
        schedule.immediate = Some(true);
    } else if let Some(minutes) = config.interval_minutes {
        if minutes <= 0 {
            return Err(CodecError::InvalidValue {
                field: "interval_minutes",
                reason: format!("must be positive, got {}", minutes),
            });
        }
        schedule.interval = Some(IntervalSchedule { minutes });
    } else if let Some(time) = present(&config.daily_time) {
        schedule.daily = Some(TimeSchedule {
            time: time.to_string(),
        });
    } else if let Some(weekly) = &config.weekly {
        if weekly.days.is_empty() {
            return Err(CodecError::InvalidValue {
                field: "weekly.days",
                reason: "at least one day is required".to_string(),
            });
        }
        schedule.weekly = Some(WeeklySchedule {
            days: weekly.days.clone(),
            time: required(&weekly.time, "weekly.time")?.to_string(),
        });
    } else if let Some(time) = present(&config.exactly_once_time) {
        schedule.exactly_once = Some(TimeSchedule {
            time: time.to_string(),
        });
    } else {
        return Ok(None);
    }
    Ok(Some(schedule))
}

pub fn flatten_schedule(schedule: &InventorySchedule) -> Option<InventoryScheduleConfig> {
    let config = InventoryScheduleConfig {
        immediate: schedule.immediate.filter(|i| *i),
        interval_minutes: schedule.interval.as_ref().map(|i| i.minutes),
        daily_time: schedule.daily.as_ref().map(|d| d.time.clone()),
        weekly: schedule.weekly.as_ref().map(|w| WeeklyScheduleConfig {
            days: w.days.clone(),
            time: w.time.clone(),
        }),
        exactly_once_time: schedule.exactly_once.as_ref().map(|e| e.time.clone()),
    };
    if config == InventoryScheduleConfig::default() {
        None
    } else {
        Some(config)
    }
}

/// Encodes properties as the JSON string Keyfactor stores them in.
pub fn expand_properties(properties: &BTreeMap<String, String>) -> String {
    let object: Map<String, Value> = properties
        .iter()
        .map(|(name, value)| {
            let mut wrapped = Map::new();
            wrapped.insert("value".to_string(), Value::String(value.clone()));
            (name.clone(), Value::Object(wrapped))
        })
        .collect();
    Value::Object(object).to_string()
}

/// Decodes the properties string, keeping only previously configured names.
/// Secret-valued properties are never echoed in clear text and keep their
/// configured value.
pub fn flatten_properties(
    raw: &str,
    previous: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, CodecError> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let parsed: Value =
        serde_json::from_str(raw).map_err(|e| CodecError::MalformedProperties(e.to_string()))?;
    let Value::Object(object) = parsed else {
        return Err(CodecError::MalformedProperties(raw.to_string()));
    };

    let mut properties = BTreeMap::new();
    for (name, configured) in previous {
        let Some(value) = object.get(name) else {
            continue;
        };
        match property_value(value) {
            Some(PropertyValue::Plain(v)) => {
                properties.insert(name.clone(), v);
            }
            Some(PropertyValue::Secret) => {
                properties.insert(name.clone(), configured.clone());
            }
            None => {}
        }
    }
    Ok(properties)
}

enum PropertyValue {
    Plain(String),
    Secret,
}

fn property_value(value: &Value) -> Option<PropertyValue> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(PropertyValue::Plain(s.clone())),
        Value::Bool(b) => Some(PropertyValue::Plain(b.to_string())),
        Value::Number(n) => Some(PropertyValue::Plain(n.to_string())),
        Value::Object(inner) => match inner.get("value").or_else(|| inner.get("Value")) {
            Some(Value::Object(_)) => Some(PropertyValue::Secret),
            Some(other) => property_value(other),
            None if inner.contains_key("SecretValue") || inner.contains_key("InstanceGuid") => {
                Some(PropertyValue::Secret)
            }
            None => None,
        },
        Value::Array(_) => Some(PropertyValue::Plain(value.to_string())),
    }
}

pub struct StoreCodec;

impl Codec for StoreCodec {
    type Config = StoreState;
    type Request = StoreRequest;
    type Response = CertificateStore;

    fn expand(config: &StoreState) -> Result<StoreRequest, CodecError> {
        let inventory_schedule = match &config.inventory_schedule {
            Some(schedule) => expand_schedule(schedule)?,
            None => None,
        };
        Ok(StoreRequest {
            id: config.id.clone(),
            container_id: config.container_id,
            client_machine: required(&config.client_machine, "client_machine")?.to_string(),
            store_path: required(&config.store_path, "store_path")?.to_string(),
            cert_store_type: config.store_type,
            agent_id: required(&config.agent_id, "agent_id")?.to_string(),
            create_if_missing: config.create_if_missing,
            properties: expand_properties(&config.properties),
            inventory_schedule,
            password: present(&config.password).map(|value| StorePassword {
                value: Some(value.to_string()),
                ..Default::default()
            }),
            set_new_password_allowed: config.set_new_password_allowed,
        })
    }

    fn flatten(
        response: &CertificateStore,
        previous: &StoreState,
    ) -> Result<StoreState, CodecError> {
        let mut state = previous.clone();
        state.id = Some(response.id.clone());
        state.container_id = response.container_id;
        state.client_machine = response.client_machine.clone();
        state.store_path = response.store_path.clone();
        state.store_type = response.cert_store_type;
        state.agent_id = response.agent_id.clone();
        state.create_if_missing = response.create_if_missing;
        state.properties = flatten_properties(&response.properties, &previous.properties)?;
        state.inventory_schedule = previous
            .inventory_schedule
            .as_ref()
            .and(response.inventory_schedule.as_ref())
            .and_then(flatten_schedule);
        state.set_new_password_allowed = response.set_new_password_allowed;
        state.approved = response.approved;
        state.agent_assigned = response.agent_assigned;
        Ok(state)
    }
}

pub struct DeploymentCodec;

impl Codec for DeploymentCodec {
    type Config = DeploymentState;
    type Request = AddToStoresRequest;
    type Response = Vec<CertificateLocation>;

    fn expand(config: &DeploymentState) -> Result<AddToStoresRequest, CodecError> {
        if config.certificate_id <= 0 {
            return Err(CodecError::MissingField("certificate_id"));
        }
        let certificate_stores = config
            .stores
            .iter()
            .map(|store| {
                Ok(StoreTarget {
                    certificate_store_id: required(
                        &store.certificate_store_id,
                        "certificate_store_id",
                    )?
                    .to_string(),
                    alias: present(&store.alias).map(String::from),
                    overwrite: true,
                    pfx_password: present(&config.key_password).map(String::from),
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        Ok(AddToStoresRequest {
            certificate_id: config.certificate_id,
            certificate_stores,
            schedule: JobSchedule::default(),
            collection_id: config.collection_id,
        })
    }

    /// Configured stores still holding the certificate keep their configured
    /// entry; locations nobody configured are appended so drift is visible.
    fn flatten(
        response: &Vec<CertificateLocation>,
        previous: &DeploymentState,
    ) -> Result<DeploymentState, CodecError> {
        let mut stores: Vec<StoreAssignment> = previous
            .stores
            .iter()
            .filter(|store| {
                response
                    .iter()
                    .any(|l| l.store_id.eq_ignore_ascii_case(&store.certificate_store_id))
            })
            .cloned()
            .collect();
        for location in response {
            let known = stores
                .iter()
                .any(|s| s.certificate_store_id.eq_ignore_ascii_case(&location.store_id));
            if !known {
                stores.push(StoreAssignment {
                    certificate_store_id: location.store_id.clone(),
                    alias: location.alias.clone(),
                });
            }
        }

        let mut state = previous.clone();
        state.id = Some(previous.certificate_id.to_string());
        state.stores = stores;
        Ok(state)
    }
}
