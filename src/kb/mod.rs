//! Knowledge-base client.
//!
//! The knowledge base is an external service holding the map as facts. It speaks a
//! small command protocol: a verb, a primary and secondary specifier, and a
//! positional argument list. Answers come back as decorated strings (IRIs for
//! individuals, typed literals for data values) which [`response`] strips.
//!
//! [`KnowledgeBaseClient`] is an owned handle: every call builds its own
//! [`KbRequest`], so clones can be shared freely across components.

pub mod response;
pub mod store;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::KbError;

pub use store::SledOntology;

const CLIENT_NAME: &str = "surveillance";
const REFERENCE_NAME: &str = "ontoRef";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    Load,
    Add,
    Replace,
    Query,
    Reason,
    Disjoint,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrimarySpec {
    None,
    File,
    ObjectProp,
    DataProp,
    Class,
    Ind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecondarySpec {
    None,
    Ind,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Command::Load => "LOAD",
            Command::Add => "ADD",
            Command::Replace => "REPLACE",
            Command::Query => "QUERY",
            Command::Reason => "REASON",
            Command::Disjoint => "DISJOINT",
            Command::Save => "SAVE",
        };
        f.write_str(verb)
    }
}

/// One protocol request. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KbRequest {
    pub client_name: String,
    pub reference_name: String,
    pub command: Command,
    pub primary: PrimarySpec,
    pub secondary: SecondarySpec,
    pub args: Vec<String>,
}

/// The transport-level contract of the knowledge-base service.
///
/// Implementations block (asynchronously) until the service answers. Transport
/// failures surface as [`KbError::Transport`]; callers treat them as fatal.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn execute(&self, request: KbRequest) -> Result<Vec<String>, KbError>;
}

/// Typed facade over a [`KnowledgeBase`] service.
#[derive(Clone)]
pub struct KnowledgeBaseClient {
    service: Arc<dyn KnowledgeBase>,
}

impl fmt::Debug for KnowledgeBaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeBaseClient")
            .field("client_name", &CLIENT_NAME)
            .field("reference_name", &REFERENCE_NAME)
            .finish()
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

impl KnowledgeBaseClient {
    pub fn new(service: Arc<dyn KnowledgeBase>) -> Self {
        Self { service }
    }

    /// Sends a raw protocol request and returns the undecorated response list.
    pub async fn execute(
        &self,
        command: Command,
        primary: PrimarySpec,
        secondary: SecondarySpec,
        args: Vec<String>,
    ) -> Result<Vec<String>, KbError> {
        let request = KbRequest {
            client_name: CLIENT_NAME.to_string(),
            reference_name: REFERENCE_NAME.to_string(),
            command,
            primary,
            secondary,
            args,
        };
        debug!(%command, ?primary, args = ?request.args, "knowledge base request");
        self.service.execute(request).await
    }

    pub async fn load_file(&self, path: &str, iri: &str) -> Result<(), KbError> {
        self.execute(
            Command::Load,
            PrimarySpec::File,
            SecondarySpec::None,
            owned(&[path, iri, "true", "PELLET", "false"]),
        )
        .await?;
        Ok(())
    }

    pub async fn save_file(&self, path: &str) -> Result<(), KbError> {
        self.execute(Command::Save, PrimarySpec::None, SecondarySpec::None, owned(&[path]))
            .await?;
        Ok(())
    }

    pub async fn reason(&self) -> Result<(), KbError> {
        self.execute(Command::Reason, PrimarySpec::None, SecondarySpec::None, owned(&[""]))
            .await?;
        Ok(())
    }

    pub async fn disjoint_individuals(&self, names: &[String]) -> Result<(), KbError> {
        self.execute(
            Command::Disjoint,
            PrimarySpec::Ind,
            SecondarySpec::None,
            names.to_vec(),
        )
        .await?;
        Ok(())
    }

    pub async fn add_object_property(
        &self,
        property: &str,
        subject: &str,
        object: &str,
    ) -> Result<(), KbError> {
        self.execute(
            Command::Add,
            PrimarySpec::ObjectProp,
            SecondarySpec::Ind,
            owned(&[property, subject, object]),
        )
        .await?;
        Ok(())
    }

    pub async fn replace_object_property(
        &self,
        property: &str,
        subject: &str,
        new: &str,
        old: &str,
    ) -> Result<(), KbError> {
        self.execute(
            Command::Replace,
            PrimarySpec::ObjectProp,
            SecondarySpec::Ind,
            owned(&[property, subject, new, old]),
        )
        .await?;
        Ok(())
    }

    pub async fn add_timestamp(
        &self,
        property: &str,
        subject: &str,
        value: i64,
    ) -> Result<(), KbError> {
        let value = value.to_string();
        self.execute(
            Command::Add,
            PrimarySpec::DataProp,
            SecondarySpec::Ind,
            owned(&[property, subject, "Long", &value]),
        )
        .await?;
        Ok(())
    }

    pub async fn replace_timestamp(
        &self,
        property: &str,
        subject: &str,
        new: i64,
        old: i64,
    ) -> Result<(), KbError> {
        let (new, old) = (new.to_string(), old.to_string());
        self.execute(
            Command::Replace,
            PrimarySpec::DataProp,
            SecondarySpec::Ind,
            owned(&[property, subject, "Long", &new, &old]),
        )
        .await?;
        Ok(())
    }

    /// Individuals related to `subject` through `property`, namespace stripped.
    pub async fn query_object_property(
        &self,
        property: &str,
        subject: &str,
    ) -> Result<Vec<String>, KbError> {
        let raw = self
            .execute(
                Command::Query,
                PrimarySpec::ObjectProp,
                SecondarySpec::Ind,
                owned(&[property, subject]),
            )
            .await?;
        raw.iter().map(|r| response::parse_individual(r)).collect()
    }

    /// Timestamps stored for `subject` under `property`.
    pub async fn query_timestamps(
        &self,
        property: &str,
        subject: &str,
    ) -> Result<Vec<i64>, KbError> {
        let raw = self
            .execute(
                Command::Query,
                PrimarySpec::DataProp,
                SecondarySpec::Ind,
                owned(&[property, subject]),
            )
            .await?;
        raw.iter().map(|r| response::parse_timestamp(r)).collect()
    }

    /// Class labels (e.g. `ROOM`, `URGENT`) the last reasoning pass gave `individual`.
    pub async fn query_classes(&self, individual: &str) -> Result<Vec<String>, KbError> {
        let raw = self
            .execute(
                Command::Query,
                PrimarySpec::Class,
                SecondarySpec::Ind,
                owned(&[individual, "false"]),
            )
            .await?;
        raw.iter().map(|r| response::parse_individual(r)).collect()
    }
}
