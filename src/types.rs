//! Runtime value types
//!
//! A `ValueType` is the runtime-generated record type for one schema
//! generation: a uniquely named, ordered set of typed members. Instances are
//! `Record`s. Every `ValueType` produced by a generator is distinct, even for
//! structurally identical member lists, so a type never survives a cache
//! invalidation.
//!
//! The field accessor (`get`/`set`/`to_map`/`from_map`) lives on `ValueType`
//! and refuses records that belong to a different type.

use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, SchemaError};
use crate::value::FieldValue;
use crate::vocabulary::FieldKind;

/// Marker attribute attached to a generated member
#[derive(Debug, Clone, PartialEq)]
pub enum MemberAttribute {
    /// Holds sensitive data; redacted from diagnostics
    Sensitive,
    /// Opaque mapping metadata carried over from the schema field
    Mapping(serde_json::Value),
}

/// Member description handed to the type generator
#[derive(Debug, Clone, PartialEq)]
pub struct MemberSpec {
    pub name: String,
    pub kind: FieldKind,
    pub attributes: Vec<MemberAttribute>,
}

impl MemberSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: MemberAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn is_sensitive(&self) -> bool {
        self.attributes.contains(&MemberAttribute::Sensitive)
    }

    pub fn mapping(&self) -> Option<&serde_json::Value> {
        self.attributes.iter().find_map(|a| match a {
            MemberAttribute::Mapping(m) => Some(m),
            _ => None,
        })
    }
}

/// A generated record type
pub struct ValueType {
    id: u64,
    name: String,
    members: Vec<MemberSpec>,
    slots: HashMap<String, usize>,
}

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

impl ValueType {
    /// Describe a new type. Every call yields a distinct type id, so two
    /// descriptors never compare equal even with identical members.
    pub fn new(name: impl Into<String>, members: Vec<MemberSpec>) -> Self {
        let slots = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        Self {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            members,
            slots,
        }
    }

    /// Process-unique type id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unique generated type name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[MemberSpec] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&MemberSpec> {
        self.slot(name).map(|i| &self.members[i])
    }

    /// Position of a member in record storage
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Construct a fresh instance with every member at its default
    pub fn instantiate(self: &Arc<Self>) -> Record {
        Record {
            values: self.members.iter().map(|m| m.kind.default_value()).collect(),
            value_type: Arc::clone(self),
        }
    }

    /// Whether the record is an instance of exactly this type
    pub fn owns(&self, record: &Record) -> bool {
        record.value_type.id == self.id
    }

    fn check_owner(&self, record: &Record) -> Result<()> {
        if self.owns(record) {
            Ok(())
        } else {
            Err(SchemaError::BindingMismatch {
                expected: self.name.clone(),
                actual: record.value_type.name.clone(),
            })
        }
    }

    fn require_slot(&self, name: &str) -> Result<usize> {
        self.slot(name).ok_or_else(|| SchemaError::FieldAccess {
            field: name.to_string(),
            reason: format!("no such member on {}", self.name),
        })
    }

    /// Read a member of an instance
    pub fn get<'r>(&self, record: &'r Record, name: &str) -> Result<&'r FieldValue> {
        self.check_owner(record)?;
        let slot = self.require_slot(name)?;
        Ok(&record.values[slot])
    }

    /// Write a member of an instance, converting to the member's kind
    pub fn set(&self, record: &mut Record, name: &str, value: FieldValue) -> Result<()> {
        self.check_owner(record)?;
        let slot = self.require_slot(name)?;
        record.store(slot, value)
    }

    /// Name → value view of an instance
    pub fn to_map(&self, record: &Record) -> Result<BTreeMap<String, FieldValue>> {
        self.check_owner(record)?;
        Ok(record.to_map())
    }

    /// Build an instance from a name → value mapping; absent members keep defaults
    pub fn from_map(self: &Arc<Self>, values: BTreeMap<String, FieldValue>) -> Result<Record> {
        let mut record = self.instantiate();
        for (name, value) in values {
            let slot = self.require_slot(&name)?;
            record.store(slot, value)?;
        }
        Ok(record)
    }
}

impl fmt::Debug for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueType")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members)
            .finish()
    }
}

impl PartialEq for ValueType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ValueType {}

/// An instance of a generated value type
#[derive(Clone)]
pub struct Record {
    value_type: Arc<ValueType>,
    values: Vec<FieldValue>,
}

impl Record {
    pub fn value_type(&self) -> &Arc<ValueType> {
        &self.value_type
    }

    /// Read a member by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.value_type.slot(name).map(|i| &self.values[i])
    }

    /// Write a member by name
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        let slot = self.value_type.require_slot(name)?;
        self.store(slot, value.into())
    }

    /// Member values in declared order
    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    /// Iterate `(member, value)` pairs in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&MemberSpec, &FieldValue)> {
        self.value_type.members.iter().zip(self.values.iter())
    }

    pub fn to_map(&self) -> BTreeMap<String, FieldValue> {
        self.iter()
            .map(|(m, v)| (m.name.clone(), v.clone()))
            .collect()
    }

    /// Like `to_map`, with sensitive members replaced by a placeholder
    pub fn redacted(&self) -> BTreeMap<String, FieldValue> {
        self.iter()
            .map(|(m, v)| {
                let shown = if m.is_sensitive() && !v.is_null() {
                    FieldValue::Text("<redacted>".to_string())
                } else {
                    v.clone()
                };
                (m.name.clone(), shown)
            })
            .collect()
    }

    pub(crate) fn store(&mut self, slot: usize, value: FieldValue) -> Result<()> {
        let member = &self.value_type.members[slot];
        match member.kind.coerce(value) {
            Ok(v) => {
                self.values[slot] = v;
                Ok(())
            }
            Err(rejected) => Err(SchemaError::FieldAccess {
                field: member.name.clone(),
                reason: format!("cannot store {} in {} member", rejected.kind_name(), member.kind),
            }),
        }
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &self.value_type.name)
            .field("values", &self.redacted())
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.value_type.id == other.value_type.id && self.values == other.values
    }
}

/// Type generation capability
pub trait TypeGenerator: Send + Sync {
    /// Create a new, distinct value type. Implementations must never return
    /// a previously issued type, even for identical member lists.
    fn create_type(&self, unique_name: &str, members: Vec<MemberSpec>) -> Result<Arc<ValueType>>;
}

/// Default generator producing `ValueType` record descriptors
#[derive(Default)]
pub struct RecordTypeGenerator {
    issued: Mutex<HashSet<String>>,
}

impl RecordTypeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of types issued so far
    pub fn issued_count(&self) -> usize {
        self.issued.lock().len()
    }
}

impl TypeGenerator for RecordTypeGenerator {
    fn create_type(&self, unique_name: &str, members: Vec<MemberSpec>) -> Result<Arc<ValueType>> {
        if members.is_empty() {
            return Err(SchemaError::TypeGeneration(format!(
                "type {} has no members",
                unique_name
            )));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = members.iter().find(|m| !seen.insert(m.name.as_str())) {
            return Err(SchemaError::TypeGeneration(format!(
                "type {} declares member {} twice",
                unique_name, dup.name
            )));
        }

        if !self.issued.lock().insert(unique_name.to_string()) {
            return Err(SchemaError::TypeGeneration(format!(
                "type name {} was already issued",
                unique_name
            )));
        }

        Ok(Arc::new(ValueType::new(unique_name, members)))
    }
}
