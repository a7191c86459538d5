use std::collections::BTreeMap;

/// A single value inside a [`PropertyMap`].
///
/// Mirrors the handful of scalar kinds that travel through the timing
/// receiver's condition objects and the matcher's tag maps; nested maps
/// carry the `meta` sub-structure (`LOCAL-TIME`, `HW-TRIGGER`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Map(PropertyMap),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PropertyValue::U64(v) => Some(*v),
            PropertyValue::I64(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::I64(v) => Some(*v),
            PropertyValue::U64(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            PropertyValue::F32(v) => Some(*v),
            PropertyValue::F64(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyMap> {
        match self {
            PropertyValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// An ordered string-keyed map of [`PropertyValue`]s.
///
/// This is the Rust stand-in for the `property_map` variant map used
/// throughout the timing stack (raw timing events, matched tags, driver
/// status reports). `BTreeMap` keeps key order deterministic, which tests
/// rely on.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Well-known keys used by raw timing events and matched tags (§3, §4.4).
pub mod keys {
    pub const TRIGGER_NAME: &str = "trigger_name";
    pub const TRIGGER_TIME: &str = "trigger_time";
    pub const TRIGGER_OFFSET: &str = "trigger_offset";
    pub const META: &str = "meta";
    pub const LOCAL_TIME: &str = "LOCAL-TIME";
    pub const HW_TRIGGER: &str = "HW-TRIGGER";
}

/// Convenience accessors for the timing-event shape used by the matcher.
pub trait TimingEventExt {
    fn trigger_time_ns(&self) -> Option<u64>;
    fn trigger_offset_ns(&self) -> Option<f32>;
    fn local_time_ns(&self) -> Option<u64>;
    fn hw_trigger(&self) -> bool;
    fn set_trigger_offset_seconds(&mut self, value: f64);
}

impl TimingEventExt for PropertyMap {
    fn trigger_time_ns(&self) -> Option<u64> {
        self.get(keys::TRIGGER_TIME).and_then(PropertyValue::as_u64)
    }

    fn trigger_offset_ns(&self) -> Option<f32> {
        self.get(keys::TRIGGER_OFFSET).and_then(PropertyValue::as_f32)
    }

    fn local_time_ns(&self) -> Option<u64> {
        self.get(keys::META)
            .and_then(PropertyValue::as_map)
            .and_then(|meta| meta.get(keys::LOCAL_TIME))
            .and_then(PropertyValue::as_u64)
            .or_else(|| self.trigger_time_ns())
    }

    fn hw_trigger(&self) -> bool {
        self.get(keys::META)
            .and_then(PropertyValue::as_map)
            .and_then(|meta| meta.get(keys::HW_TRIGGER))
            .and_then(PropertyValue::as_bool)
            .unwrap_or(false)
    }

    fn set_trigger_offset_seconds(&mut self, value: f64) {
        self.insert(keys::TRIGGER_OFFSET.to_string(), PropertyValue::F32(value as f32));
    }
}
