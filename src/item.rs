//! Item identity and content model.
//!
//! Every row rendered by a controller is described by an [`Item`]: a value
//! with a stable [`Identity`] (which row this is, across builds), a content
//! fingerprint (has the row's data changed), and a [`ViewType`] (is the row
//! structurally compatible with its previous incarnation).
//!
//! Identity and fingerprint are independent axes. Two items can share an
//! identity but differ in fingerprint (the row updated in place), or share a
//! fingerprint but carry different identities (unrelated rows that happen to
//! look alike).

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Stable key distinguishing logical rows across builds.
///
/// An identity is either a numeric id or an ordered sequence of string keys.
/// Equality is value equality: equal numbers, or equal key sequences in the
/// same order. Identities never compare content; see
/// [`Item::content_fingerprint`] for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Numeric id, typically a database key.
    Id(i64),
    /// Ordered sequence of string keys, for rows without a natural number id.
    Keys(Arc<[String]>),
}

impl Identity {
    /// Build a key-sequence identity from anything yielding strings.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Identity::Keys(keys.into_iter().map(Into::into).collect())
    }
}

impl From<i64> for Identity {
    fn from(id: i64) -> Self {
        Identity::Id(id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Id(id) => write!(f, "id {}", id),
            Identity::Keys(keys) => write!(f, "key [{}]", keys.join(", ")),
        }
    }
}

/// Structural classifier for rows.
///
/// Two items at the same identity are only eligible for an in-place update
/// when their view types are equal; otherwise the old row is removed and the
/// new one inserted, since the rendering surface cannot rebind a view of one
/// shape into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewType(pub u32);

/// One row's data descriptor.
///
/// Implementations must uphold two contracts:
///
/// - `identity` is stable for the lifetime of the value and unique within a
///   single built list.
/// - `content_fingerprint` is pure and deterministic: equal field values
///   produce equal fingerprints regardless of object identity, and any
///   change to a hash-contributing field changes the fingerprint. Fields
///   that must not trigger rebinds (transient listener references and the
///   like) are excluded from the hash, as is the identity itself.
///
/// [`RowItem`] is a ready-made implementation for callers that do not want a
/// dedicated type per row shape.
pub trait Item: fmt::Debug + Send + Sync + 'static {
    /// The stable key for this row.
    fn identity(&self) -> Identity;

    /// Hash over all change-relevant fields, excluding the identity and any
    /// non-contributing fields.
    fn content_fingerprint(&self) -> u64;

    /// The structural classifier for this row.
    fn view_type(&self) -> ViewType;
}

/// Returns whether two items are the same logical row.
pub fn same_identity(a: &dyn Item, b: &dyn Item) -> bool {
    a.identity() == b.identity()
}

/// A field value held by a [`RowItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number, hashed by bit pattern.
    Float(f64),
    /// Text content.
    Text(String),
}

impl FieldValue {
    fn hash_into(&self, hasher: &mut impl Hasher) {
        match self {
            FieldValue::Bool(v) => {
                0u8.hash(hasher);
                v.hash(hasher);
            }
            FieldValue::Int(v) => {
                1u8.hash(hasher);
                v.hash(hasher);
            }
            FieldValue::Float(v) => {
                2u8.hash(hasher);
                v.to_bits().hash(hasher);
            }
            FieldValue::Text(v) => {
                3u8.hash(hasher);
                v.hash(hasher);
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    value: FieldValue,
    contributes: bool,
}

/// Generic item envelope: a field map plus identity and view-type
/// capabilities.
///
/// `RowItem` replaces one-concrete-type-per-row-shape with composition. A
/// row is described by its view type, an identity set through the fluent
/// `id` family, and named fields. Fields added with [`field`](Self::field)
/// contribute to the content fingerprint; fields added with
/// [`transient_field`](Self::transient_field) do not and so never trigger an
/// update on their own.
///
/// # Example
///
/// ```ignore
/// use model_flow::{RowItem, ViewType};
///
/// let header = RowItem::new(ViewType(1))
///     .id(42)
///     .field("title", "Inbox")
///     .field("unread", 7)
///     .transient_field("click_token", 9912);
/// ```
#[derive(Debug, Clone)]
pub struct RowItem {
    identity: Identity,
    view_type: ViewType,
    fields: Vec<Field>,
}

impl RowItem {
    /// Create an item of the given view type.
    ///
    /// The identity defaults to `Id(0)`; set it with [`id`](Self::id) or
    /// [`id_keys`](Self::id_keys). Leaving the default on more than one item
    /// in a build is a duplicate-identity usage error.
    pub fn new(view_type: ViewType) -> Self {
        Self {
            identity: Identity::Id(0),
            view_type,
            fields: Vec::new(),
        }
    }

    /// Set a numeric identity.
    pub fn id(mut self, id: i64) -> Self {
        self.identity = Identity::Id(id);
        self
    }

    /// Set a key-sequence identity.
    pub fn id_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity = Identity::keys(keys);
        self
    }

    /// Add a hash-contributing field.
    pub fn field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            value: value.into(),
            contributes: true,
        });
        self
    }

    /// Add a field excluded from the content fingerprint.
    ///
    /// Use this for values that must not cause rebinds when they change,
    /// such as listener tokens.
    pub fn transient_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            value: value.into(),
            contributes: false,
        });
        self
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }
}

impl Item for RowItem {
    fn identity(&self) -> Identity {
        self.identity.clone()
    }

    // DefaultHasher is seeded with fixed keys, so fingerprints are
    // deterministic across instances and processes.
    fn content_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for field in self.fields.iter().filter(|f| f.contributes) {
            field.name.hash(&mut hasher);
            field.value.hash_into(&mut hasher);
        }
        hasher.finish()
    }

    fn view_type(&self) -> ViewType {
        self.view_type
    }
}
