//! Publish contexts and their portable encoding.
//!
//! A [`Context`] maps names to either plain JSON values or live domain
//! entities. Before it crosses a task boundary it is encoded into a
//! [`PortableContext`], where every entity is replaced by a tagged reference
//! `{"_type": "<kind>", "_id": "<uuid>"}`. Decoding resolves those references
//! again through an [`EntityResolver`]; references that no longer resolve
//! decode to `null`.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  model::{Message, Recipient, Subscription, Topic},
  store::EntityResolver,
};

const TYPE_TAG: &str = "_type";
const ID_TAG: &str = "_id";

// ─── Entities ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Recipient,
  Topic,
  Subscription,
  Message,
}

impl EntityKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Recipient => "recipient",
      Self::Topic => "topic",
      Self::Subscription => "subscription",
      Self::Message => "message",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "recipient" => Some(Self::Recipient),
      "topic" => Some(Self::Topic),
      "subscription" => Some(Self::Subscription),
      "message" => Some(Self::Message),
      _ => None,
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A domain entity that may be referenced from a context.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
  Recipient(Recipient),
  Topic(Topic),
  Subscription(Subscription),
  Message(Message),
}

impl Entity {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Recipient(_) => EntityKind::Recipient,
      Self::Topic(_) => EntityKind::Topic,
      Self::Subscription(_) => EntityKind::Subscription,
      Self::Message(_) => EntityKind::Message,
    }
  }

  pub fn id(&self) -> Uuid {
    match self {
      Self::Recipient(r) => r.recipient_id,
      Self::Topic(t) => t.topic_id,
      Self::Subscription(s) => s.subscription_id,
      Self::Message(m) => m.message_id,
    }
  }

  /// The entity as templates see it: its fields plus computed attributes
  /// (`id`, and `full_name`/`name` for recipients).
  pub fn to_template_value(&self) -> Value {
    let serialized = match self {
      Self::Recipient(r) => serde_json::to_value(r),
      Self::Topic(t) => serde_json::to_value(t),
      Self::Subscription(s) => serde_json::to_value(s),
      Self::Message(m) => serde_json::to_value(m),
    };
    let mut object = match serialized {
      Ok(Value::Object(map)) => map,
      _ => Map::new(),
    };
    object.insert("id".into(), Value::String(self.id().to_string()));
    if let Self::Recipient(r) = self {
      let full_name = r.full_name();
      object.insert("full_name".into(), Value::String(full_name.clone()));
      object.insert("name".into(), Value::String(full_name));
    }
    Value::Object(object)
  }

  fn to_reference(&self) -> Value {
    let mut tag = Map::new();
    tag.insert(TYPE_TAG.into(), Value::String(self.kind().as_str().into()));
    tag.insert(ID_TAG.into(), Value::String(self.id().to_string()));
    Value::Object(tag)
  }
}

// ─── Context ─────────────────────────────────────────────────────────────────

/// A single context value: either plain data or a domain entity.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
  Primitive(Value),
  Entity(Entity),
}

impl ContextValue {
  pub fn null() -> Self { Self::Primitive(Value::Null) }

  pub fn as_entity(&self) -> Option<&Entity> {
    match self {
      Self::Entity(e) => Some(e),
      Self::Primitive(_) => None,
    }
  }

  /// The value as templates see it.
  pub fn to_template_value(&self) -> Value {
    match self {
      Self::Primitive(v) => v.clone(),
      Self::Entity(e) => e.to_template_value(),
    }
  }
}

impl From<Entity> for ContextValue {
  fn from(e: Entity) -> Self { Self::Entity(e) }
}

impl From<Recipient> for ContextValue {
  fn from(r: Recipient) -> Self { Self::Entity(Entity::Recipient(r)) }
}

impl From<Topic> for ContextValue {
  fn from(t: Topic) -> Self { Self::Entity(Entity::Topic(t)) }
}

impl From<Subscription> for ContextValue {
  fn from(s: Subscription) -> Self { Self::Entity(Entity::Subscription(s)) }
}

impl From<Message> for ContextValue {
  fn from(m: Message) -> Self { Self::Entity(Entity::Message(m)) }
}

impl From<Value> for ContextValue {
  fn from(v: Value) -> Self { Self::Primitive(v) }
}

impl From<&str> for ContextValue {
  fn from(s: &str) -> Self { Self::Primitive(Value::String(s.to_owned())) }
}

impl From<String> for ContextValue {
  fn from(s: String) -> Self { Self::Primitive(Value::String(s)) }
}

impl From<i64> for ContextValue {
  fn from(n: i64) -> Self { Self::Primitive(Value::from(n)) }
}

impl From<bool> for ContextValue {
  fn from(b: bool) -> Self { Self::Primitive(Value::Bool(b)) }
}

/// A decoded publish context.
pub type Context = BTreeMap<String, ContextValue>;

/// The variables a template sees for `context`.
pub fn template_scope(context: &Context) -> Map<String, Value> {
  context
    .iter()
    .map(|(k, v)| (k.clone(), v.to_template_value()))
    .collect()
}

// ─── Portable form ───────────────────────────────────────────────────────────

/// A context safe to serialise across an asynchronous boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortableContext(pub Map<String, Value>);

impl PortableContext {
  pub fn into_value(self) -> Value { Value::Object(self.0) }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// Replace every entity in `context` with a tagged reference.
pub fn encode(context: &Context) -> PortableContext {
  let map = context
    .iter()
    .map(|(k, v)| {
      let encoded = match v {
        ContextValue::Primitive(p) => p.clone(),
        ContextValue::Entity(e) => e.to_reference(),
      };
      (k.clone(), encoded)
    })
    .collect();
  PortableContext(map)
}

/// The outcome of inspecting a portable value for the reference shape.
enum Reference {
  /// Not a reference; pass through.
  NotTagged,
  /// Tagged, but names an unknown kind or a malformed id.
  Dangling,
  Tagged(EntityKind, Uuid),
}

fn classify(value: &Value) -> Reference {
  let Value::Object(map) = value else {
    return Reference::NotTagged;
  };
  if map.len() != 2 {
    return Reference::NotTagged;
  }
  let (Some(Value::String(kind)), Some(id)) = (map.get(TYPE_TAG), map.get(ID_TAG))
  else {
    return Reference::NotTagged;
  };
  let id = match id {
    Value::String(s) => Uuid::parse_str(s).ok(),
    _ => None,
  };
  match (EntityKind::parse(kind), id) {
    (Some(kind), Some(id)) => Reference::Tagged(kind, id),
    _ => Reference::Dangling,
  }
}

/// Resolve every tagged reference in `portable` through `resolver`.
///
/// References that do not resolve become `null`. Errors from the resolver
/// itself are returned.
pub async fn decode<R>(
  portable: &PortableContext,
  resolver: &R,
) -> Result<Context, R::Error>
where
  R: EntityResolver + ?Sized,
{
  let mut context = Context::new();
  for (key, value) in &portable.0 {
    let decoded = match classify(value) {
      Reference::NotTagged => ContextValue::Primitive(value.clone()),
      Reference::Dangling => {
        tracing::debug!(key = %key, "malformed entity reference decoded to null");
        ContextValue::null()
      }
      Reference::Tagged(kind, id) => match resolver.resolve(kind, id).await? {
        Some(entity) => ContextValue::Entity(entity),
        None => {
          tracing::debug!(key = %key, %kind, %id, "entity reference not found");
          ContextValue::null()
        }
      },
    };
    context.insert(key.clone(), decoded);
  }
  Ok(context)
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, convert::Infallible, future::Future};

  use chrono::Utc;
  use serde_json::json;

  use super::*;

  struct MapResolver(HashMap<Uuid, Entity>);

  impl EntityResolver for MapResolver {
    type Error = Infallible;

    fn resolve(
      &self,
      kind: EntityKind,
      id: Uuid,
    ) -> impl Future<Output = Result<Option<Entity>, Infallible>> + Send + '_ {
      let found = self.0.get(&id).filter(|e| e.kind() == kind).cloned();
      async move { Ok(found) }
    }
  }

  fn ada() -> Recipient {
    Recipient {
      recipient_id: Uuid::new_v4(),
      email:        "ada@example.com".into(),
      first_name:   Some("Ada".into()),
      last_name:    Some("Lovelace".into()),
      timezone:     None,
      created_at:   Utc::now(),
    }
  }

  #[test]
  fn encode_replaces_entities_with_references() {
    let user = ada();
    let mut ctx = Context::new();
    ctx.insert("user".into(), user.clone().into());
    ctx.insert("count".into(), 3_i64.into());

    let portable = encode(&ctx);
    assert_eq!(
      portable.0["user"],
      json!({ "_type": "recipient", "_id": user.recipient_id.to_string() })
    );
    assert_eq!(portable.0["count"], json!(3));
  }

  #[tokio::test]
  async fn decode_resolves_references_to_equal_entities() {
    let user = ada();
    let resolver = MapResolver(HashMap::from([(
      user.recipient_id,
      Entity::Recipient(user.clone()),
    )]));

    let mut ctx = Context::new();
    ctx.insert("user".into(), user.clone().into());
    ctx.insert("note".into(), "hello".into());
    ctx.insert("flag".into(), true.into());

    let decoded = decode(&encode(&ctx), &resolver).await.unwrap();
    assert_eq!(decoded, ctx);
  }

  #[tokio::test]
  async fn missing_entity_decodes_to_null() {
    let resolver = MapResolver(HashMap::new());
    let portable = PortableContext(
      json!({
        "user": { "_type": "recipient", "_id": Uuid::new_v4().to_string() },
        "bogus": { "_type": "spaceship", "_id": Uuid::new_v4().to_string() },
      })
      .as_object()
      .cloned()
      .unwrap(),
    );

    let decoded = decode(&portable, &resolver).await.unwrap();
    assert_eq!(decoded["user"], ContextValue::null());
    assert_eq!(decoded["bogus"], ContextValue::null());
  }

  #[tokio::test]
  async fn objects_without_the_exact_tag_shape_pass_through() {
    let resolver = MapResolver(HashMap::new());
    let value = json!({ "_type": "recipient", "_id": "x", "extra": 1 });
    let portable =
      PortableContext(Map::from_iter([("thing".to_owned(), value.clone())]));

    let decoded = decode(&portable, &resolver).await.unwrap();
    assert_eq!(decoded["thing"], ContextValue::Primitive(value));
  }

  #[test]
  fn recipient_template_value_has_computed_name() {
    let value = Entity::Recipient(ada()).to_template_value();
    assert_eq!(value["full_name"], json!("Ada Lovelace"));
    assert_eq!(value["name"], json!("Ada Lovelace"));
    assert_eq!(value["email"], json!("ada@example.com"));
  }
}
