//! # Mock Adapter
//!
//! [`MockAdapter`] answers adapter calls from a queue of expectations, so
//! tests can script storage behavior and assert what the core sent.
//!
//! - Each call pops the next expectation. Its capability must match the call.
//! - A capability with no queued expectation behaves as unsupported, which
//!   lets a test exercise the core's fallback paths.
//! - Every call is recorded with its payload (query, change set, ids).
//!
//! ```
//! # use modelkit::{Attribute, MockAdapter, Model, Query};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let post = Model::new("post");
//! post.attr("id", Attribute::primary()).unwrap();
//!
//! let mock = MockAdapter::new();
//! mock.expect_count().return_ok(3);
//! post.set_adapter(mock.clone());
//!
//! assert_eq!(post.count(Query::new()).await.unwrap(), 3);
//! mock.verify();
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::adapter::{Adapter, Capability};
use crate::error::ModelError;
use crate::instance::Instance;
use crate::model::Model;
use crate::relation::Relation;
use crate::value::{Attributes, Query, RawCollection};

enum Response {
    Row(Result<Option<Attributes>, ModelError>),
    Rows(Result<Vec<Attributes>, ModelError>),
    Collection(Result<RawCollection, ModelError>),
    Count(Result<u64, ModelError>),
    Flag(Result<bool, ModelError>),
    Unit(Result<(), ModelError>),
}

struct Expectation {
    capability: Capability,
    response: Response,
}

/// One adapter call received by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub capability: Capability,
    /// Query, change set, rows or primary keys, depending on the call.
    pub payload: Value,
}

/// Expectation-driven adapter for tests.
#[derive(Clone, Default)]
pub struct MockAdapter {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn expect<T>(
        &self,
        capability: Capability,
        wrap: fn(Result<T, ModelError>) -> Response,
    ) -> ExpectationBuilder<T> {
        ExpectationBuilder {
            capability,
            wrap,
            expectations: self.expectations.clone(),
        }
    }

    pub fn expect_find(&self) -> ExpectationBuilder<Option<Attributes>> {
        self.expect(Capability::Find, Response::Row)
    }

    pub fn expect_find_all(&self) -> ExpectationBuilder<RawCollection> {
        self.expect(Capability::FindAll, Response::Collection)
    }

    pub fn expect_count(&self) -> ExpectationBuilder<u64> {
        self.expect(Capability::Count, Response::Count)
    }

    pub fn expect_remove_all(&self) -> ExpectationBuilder<()> {
        self.expect(Capability::RemoveAll, Response::Unit)
    }

    pub fn expect_save(&self) -> ExpectationBuilder<Option<Attributes>> {
        self.expect(Capability::Save, Response::Row)
    }

    pub fn expect_remove(&self) -> ExpectationBuilder<()> {
        self.expect(Capability::Remove, Response::Unit)
    }

    pub fn expect_related_add(&self) -> ExpectationBuilder<()> {
        self.expect(Capability::RelatedAdd, Response::Unit)
    }

    pub fn expect_related_find_all(&self) -> ExpectationBuilder<Vec<Attributes>> {
        self.expect(Capability::RelatedFindAll, Response::Rows)
    }

    pub fn expect_related_find(&self) -> ExpectationBuilder<Option<Attributes>> {
        self.expect(Capability::RelatedFind, Response::Row)
    }

    pub fn expect_related_count(&self) -> ExpectationBuilder<u64> {
        self.expect(Capability::RelatedCount, Response::Count)
    }

    pub fn expect_related_create(&self) -> ExpectationBuilder<Vec<Attributes>> {
        self.expect(Capability::RelatedCreate, Response::Rows)
    }

    pub fn expect_related_has(&self) -> ExpectationBuilder<bool> {
        self.expect(Capability::RelatedHas, Response::Flag)
    }

    pub fn expect_related_remove(&self) -> ExpectationBuilder<()> {
        self.expect(Capability::RelatedRemove, Response::Unit)
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Capabilities of the calls received so far, in order.
    pub fn called(&self) -> Vec<Capability> {
        self.calls.lock().iter().map(|call| call.capability).collect()
    }

    /// Panics unless every expectation was consumed.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }

    fn next(&self, capability: Capability, payload: Value) -> Result<Response, ModelError> {
        self.calls.lock().push(Call {
            capability,
            payload,
        });

        let mut expectations = self.expectations.lock();
        if !expectations.iter().any(|e| e.capability == capability) {
            return Err(ModelError::NoAdapterSupport(capability));
        }
        match expectations.pop_front() {
            Some(expectation) if expectation.capability == capability => Ok(expectation.response),
            Some(expectation) => panic!(
                "Unexpected adapter call: got {capability}, expected {}",
                expectation.capability
            ),
            None => Err(ModelError::NoAdapterSupport(capability)),
        }
    }
}

fn primaries(instances: &[Instance]) -> Value {
    instances
        .iter()
        .map(|instance| instance.primary().unwrap_or(Value::Null))
        .collect()
}

fn mismatch(capability: Capability) -> ! {
    panic!("Expectation for {capability} holds a response of the wrong shape")
}

/// Queues the response of one expected call.
pub struct ExpectationBuilder<T> {
    capability: Capability,
    wrap: fn(Result<T, ModelError>) -> Response,
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
}

impl<T> ExpectationBuilder<T> {
    pub fn return_ok(self, value: T) {
        self.push(Ok(value));
    }

    pub fn return_err(self, error: ModelError) {
        self.push(Err(error));
    }

    fn push(self, response: Result<T, ModelError>) {
        self.expectations.lock().push_back(Expectation {
            capability: self.capability,
            response: (self.wrap)(response),
        });
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn find(&self, _model: &Model, query: &Query) -> Result<Option<Attributes>, ModelError> {
        match self.next(Capability::Find, Value::Object(query.clone().into_inner()))? {
            Response::Row(response) => response,
            _ => mismatch(Capability::Find),
        }
    }

    async fn find_all(&self, _model: &Model, query: &Query) -> Result<RawCollection, ModelError> {
        match self.next(Capability::FindAll, Value::Object(query.clone().into_inner()))? {
            Response::Collection(response) => response,
            _ => mismatch(Capability::FindAll),
        }
    }

    async fn count(&self, _model: &Model, query: &Query) -> Result<u64, ModelError> {
        match self.next(Capability::Count, Value::Object(query.clone().into_inner()))? {
            Response::Count(response) => response,
            _ => mismatch(Capability::Count),
        }
    }

    async fn remove_all(&self, _model: &Model, query: &Query) -> Result<(), ModelError> {
        match self.next(Capability::RemoveAll, Value::Object(query.clone().into_inner()))? {
            Response::Unit(response) => response,
            _ => mismatch(Capability::RemoveAll),
        }
    }

    async fn save(
        &self,
        _instance: &Instance,
        changed: &Attributes,
    ) -> Result<Option<Attributes>, ModelError> {
        match self.next(Capability::Save, Value::Object(changed.clone()))? {
            Response::Row(response) => response,
            _ => mismatch(Capability::Save),
        }
    }

    async fn remove(&self, instance: &Instance) -> Result<(), ModelError> {
        let id = instance.primary().unwrap_or(Value::Null);
        match self.next(Capability::Remove, id)? {
            Response::Unit(response) => response,
            _ => mismatch(Capability::Remove),
        }
    }

    async fn related_add(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        related: &[Instance],
    ) -> Result<(), ModelError> {
        match self.next(Capability::RelatedAdd, primaries(related))? {
            Response::Unit(response) => response,
            _ => mismatch(Capability::RelatedAdd),
        }
    }

    async fn related_find_all(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        query: &Query,
    ) -> Result<Vec<Attributes>, ModelError> {
        let payload = Value::Object(query.clone().into_inner());
        match self.next(Capability::RelatedFindAll, payload)? {
            Response::Rows(response) => response,
            _ => mismatch(Capability::RelatedFindAll),
        }
    }

    async fn related_find(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        query: &Query,
    ) -> Result<Option<Attributes>, ModelError> {
        let payload = Value::Object(query.clone().into_inner());
        match self.next(Capability::RelatedFind, payload)? {
            Response::Row(response) => response,
            _ => mismatch(Capability::RelatedFind),
        }
    }

    async fn related_count(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        query: &Query,
    ) -> Result<u64, ModelError> {
        let payload = Value::Object(query.clone().into_inner());
        match self.next(Capability::RelatedCount, payload)? {
            Response::Count(response) => response,
            _ => mismatch(Capability::RelatedCount),
        }
    }

    async fn related_create(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        rows: &[Attributes],
    ) -> Result<Vec<Attributes>, ModelError> {
        let payload = rows.iter().cloned().map(Value::Object).collect();
        match self.next(Capability::RelatedCreate, payload)? {
            Response::Rows(response) => response,
            _ => mismatch(Capability::RelatedCreate),
        }
    }

    async fn related_has(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        candidate: &Instance,
    ) -> Result<bool, ModelError> {
        let id = candidate.primary().unwrap_or(Value::Null);
        match self.next(Capability::RelatedHas, id)? {
            Response::Flag(response) => response,
            _ => mismatch(Capability::RelatedHas),
        }
    }

    async fn related_remove(
        &self,
        _relation: &Relation,
        _owner: &Instance,
        related: &[Instance],
    ) -> Result<(), ModelError> {
        match self.next(Capability::RelatedRemove, primaries(related))? {
            Response::Unit(response) => response,
            _ => mismatch(Capability::RelatedRemove),
        }
    }
}
