use crate::error::ApiError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Filter name to query value, ordered so query strings are deterministic.
pub type Filters = BTreeMap<String, String>;

/// One structured record: field name to value.
pub type Record = Map<String, Value>;

// Data categories published by the ALEPE open-data API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Parlamentares,
    Cargos,
    Lotacoes,
    Servidores,
    Remuneracao,
    Licitacoes,
    Contratos,
}

impl Endpoint {
    pub const ALL: [Endpoint; 7] = [
        Endpoint::Parlamentares,
        Endpoint::Cargos,
        Endpoint::Lotacoes,
        Endpoint::Servidores,
        Endpoint::Remuneracao,
        Endpoint::Licitacoes,
        Endpoint::Contratos,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Parlamentares => "parlamentares",
            Endpoint::Cargos => "cargos",
            Endpoint::Lotacoes => "lotacoes",
            Endpoint::Servidores => "servidores",
            Endpoint::Remuneracao => "remuneracao",
            Endpoint::Licitacoes => "licitacoes",
            Endpoint::Contratos => "contratos",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Endpoint::Parlamentares => "Dados dos deputados estaduais",
            Endpoint::Cargos => "Cargos disponíveis na ALEPE",
            Endpoint::Lotacoes => "Lotações organizacionais",
            Endpoint::Servidores => "Dados dos servidores públicos",
            Endpoint::Remuneracao => "Informações de remuneração",
            Endpoint::Licitacoes => "Processos licitatórios",
            Endpoint::Contratos => "Contratos firmados",
        }
    }

    /// Filter names the endpoint understands. Empty means unrestricted.
    pub fn filters(self) -> &'static [&'static str] {
        match self {
            Endpoint::Parlamentares => &["partido", "situacao", "legislatura"],
            Endpoint::Servidores => &["vinculo", "situacao", "cargo", "lotacao"],
            Endpoint::Contratos => &["ano", "valor_min", "valor_max", "fornecedor"],
            Endpoint::Licitacoes => &["ano", "modalidade", "situacao"],
            Endpoint::Remuneracao => &["ano", "mes", "vinculo"],
            Endpoint::Cargos | Endpoint::Lotacoes => &[],
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|e| e.name()).collect()
    }
}

impl FromStr for Endpoint {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| {
                ApiError::validation(format!(
                    "unsupported endpoint '{}'; available endpoints: {}",
                    s,
                    Self::names().join(", ")
                ))
            })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response format: structured JSON records or delimited (CSV) text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    pub const SUPPORTED: [&'static str; 2] = ["json", "csv"];

    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Csv => "csv",
        }
    }

    pub fn accept(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Csv => "text/csv, text/plain;q=0.9",
        }
    }
}

impl FromStr for Format {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "csv" => Ok(Format::Csv),
            _ => Err(ApiError::validation(format!(
                "unsupported format '{}'; supported formats: {}",
                s,
                Self::SUPPORTED.join(", ")
            ))),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a request points at: a catalogued endpoint, or a path the caller
/// explicitly asked to pass through unchecked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Known(Endpoint),
    Passthrough(String),
}

impl Target {
    pub fn resolve(endpoint: &str, passthrough: bool) -> Result<Self, ApiError> {
        let trimmed = endpoint.trim().trim_matches('/');
        match trimmed.parse::<Endpoint>() {
            Ok(known) => return Ok(Target::Known(known)),
            Err(err) if !passthrough => return Err(err),
            Err(_) => {}
        }
        if trimmed.is_empty() || trimmed.split('/').any(|seg| seg.is_empty() || seg == "..") {
            return Err(ApiError::validation(format!(
                "invalid passthrough endpoint '{}'",
                endpoint
            )));
        }
        Ok(Target::Passthrough(trimmed.to_string()))
    }

    pub fn path(&self) -> &str {
        match self {
            Target::Known(e) => e.name(),
            Target::Passthrough(p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub target: Target,
    pub format: Format,
    pub filters: Filters,
}

impl RequestSpec {
    pub fn new(endpoint: Endpoint, format: Format) -> Self {
        Self {
            target: Target::Known(endpoint),
            format,
            filters: Filters::new(),
        }
    }

    /// Parse the loosely typed tool inputs; fails before any I/O happens.
    pub fn parse(
        endpoint: &str,
        format: &str,
        filters: Filters,
        passthrough: bool,
    ) -> Result<Self, ApiError> {
        let format = format.parse::<Format>()?;
        let target = Target::resolve(endpoint, passthrough)?;
        Ok(Self {
            target,
            format,
            filters,
        })
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Records(Vec<Record>),
    Text(String),
}

impl Payload {
    /// Record count: list length for JSON; non-blank lines minus the header for CSV.
    pub fn record_count(&self) -> usize {
        match self {
            Payload::Records(items) => items.len(),
            Payload::Text(text) => text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count()
                .saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub endpoint: String,
    #[serde(rename = "formato")]
    pub format: Format,
    #[serde(rename = "filtros_aplicados")]
    pub filters: Filters,
    #[serde(rename = "total_registros")]
    pub total_records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorShape {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

impl From<&ApiError> for ErrorShape {
    fn from(err: &ApiError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            status: err.status(),
            attempts: err.attempts(),
        }
    }
}

/// Uniform outcome of every data operation. Either fully successful
/// (payload and metadata) or a failure (error only).
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEnvelope {
    Success { data: Payload, metadata: Metadata },
    Failure { error: ErrorShape },
}

impl ResultEnvelope {
    pub fn success(spec: &RequestSpec, data: Payload) -> Self {
        let metadata = Metadata {
            endpoint: spec.target.path().to_string(),
            format: spec.format,
            filters: spec.filters.clone(),
            total_records: data.record_count(),
        };
        ResultEnvelope::Success { data, metadata }
    }

    pub fn failure(err: &ApiError) -> Self {
        ResultEnvelope::Failure {
            error: ErrorShape::from(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultEnvelope::Success { .. })
    }

    pub fn data(&self) -> Option<&Payload> {
        match self {
            ResultEnvelope::Success { data, .. } => Some(data),
            ResultEnvelope::Failure { .. } => None,
        }
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        match self {
            ResultEnvelope::Success { metadata, .. } => Some(metadata),
            ResultEnvelope::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorShape> {
        match self {
            ResultEnvelope::Success { .. } => None,
            ResultEnvelope::Failure { error } => Some(error),
        }
    }
}

impl Serialize for ResultEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResultEnvelope::Success { data, metadata } => {
                let mut s = serializer.serialize_struct("ResultEnvelope", 3)?;
                s.serialize_field("success", &true)?;
                s.serialize_field("data", data)?;
                s.serialize_field("metadata", metadata)?;
                s.end()
            }
            ResultEnvelope::Failure { error } => {
                let mut s = serializer.serialize_struct("ResultEnvelope", 2)?;
                s.serialize_field("success", &false)?;
                s.serialize_field("error", error)?;
                s.end()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub reachable: bool,
    pub latency_seconds: f64,
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: String,
    pub available_endpoints: Vec<&'static str>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
