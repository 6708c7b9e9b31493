use crate::error::ApiError;
use crate::http::AlepeClient;
use crate::types::{Endpoint, Filters, Format, RequestSpec, ResultEnvelope, Target};
use crate::validators::{self, SITUACAO, VINCULO};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "alepe-mcp";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Structured result of a tool call, before MCP wrapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub structured: Value,
    pub is_error: bool,
}

impl ToolOutput {
    fn ok(structured: Value) -> Self {
        Self {
            structured,
            is_error: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    Internal(#[from] serde_json::Error),
}

/// Tools backed by a single catalogued endpoint.
pub fn dedicated_endpoint(tool: &str) -> Option<Endpoint> {
    let endpoint = match tool {
        "get_parlamentares" => Endpoint::Parlamentares,
        "get_servidores" => Endpoint::Servidores,
        "get_contratos" => Endpoint::Contratos,
        "get_licitacoes" => Endpoint::Licitacoes,
        "get_remuneracao" => Endpoint::Remuneracao,
        "get_cargos" => Endpoint::Cargos,
        "get_lotacoes" => Endpoint::Lotacoes,
        _ => return None,
    };
    Some(endpoint)
}

fn formato_schema() -> Value {
    json!({"type": "string", "enum": Format::SUPPORTED, "default": "json", "description": "Formato dos dados (json ou csv)"})
}

fn endpoint_tool(name: &str, description: &str, properties: Value) -> ToolDescriptor {
    let mut props = properties.as_object().cloned().unwrap_or_default();
    props.insert("formato".into(), formato_schema());
    ToolDescriptor {
        name: name.into(),
        description: description.into(),
        input_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": props,
        }),
    }
}

pub fn tool_descriptors() -> Vec<ToolDescriptor> {
    let list_endpoints = ToolDescriptor {
        name: "list_available_endpoints".into(),
        description: "Lista os endpoints da API da ALEPE com descrições e filtros disponíveis".into(),
        input_schema: json!({"type": "object", "additionalProperties": false, "properties": {}}),
    };

    let parlamentares = endpoint_tool(
        "get_parlamentares",
        "Busca dados dos deputados estaduais da ALEPE",
        json!({
            "partido": {"type": "string", "description": "Sigla do partido (ex: PT, PSDB)"},
            "situacao": {"type": "string", "enum": SITUACAO},
            "legislatura": {"type": "integer", "minimum": 1, "maximum": 20}
        }),
    );

    let servidores = endpoint_tool(
        "get_servidores",
        "Busca dados dos servidores da ALEPE",
        json!({
            "vinculo": {"type": "string", "enum": VINCULO},
            "situacao": {"type": "string", "enum": SITUACAO},
            "cargo": {"type": "string"},
            "lotacao": {"type": "string"}
        }),
    );

    let contratos = endpoint_tool(
        "get_contratos",
        "Busca dados dos contratos da ALEPE",
        json!({
            "ano": {"type": "integer", "minimum": validators::FIRST_YEAR},
            "valor_min": {"type": "number", "minimum": 0},
            "valor_max": {"type": "number", "minimum": 0},
            "fornecedor": {"type": "string", "description": "Nome ou CNPJ do fornecedor"}
        }),
    );

    let licitacoes = endpoint_tool(
        "get_licitacoes",
        "Busca dados das licitações da ALEPE",
        json!({
            "ano": {"type": "integer", "minimum": validators::FIRST_YEAR},
            "modalidade": {"type": "string"},
            "situacao": {"type": "string", "enum": SITUACAO}
        }),
    );

    let remuneracao = endpoint_tool(
        "get_remuneracao",
        "Busca dados de remuneração da ALEPE",
        json!({
            "ano": {"type": "integer", "minimum": validators::FIRST_YEAR},
            "mes": {"type": "integer", "minimum": 1, "maximum": 12},
            "vinculo": {"type": "string", "enum": VINCULO}
        }),
    );

    let cargos = endpoint_tool("get_cargos", "Busca os cargos disponíveis na ALEPE", json!({}));
    let lotacoes = endpoint_tool(
        "get_lotacoes",
        "Busca as lotações organizacionais da ALEPE",
        json!({}),
    );

    let search = ToolDescriptor {
        name: "search_data".into(),
        description: "Busca dados de qualquer endpoint da ALEPE com filtros personalizados".into(),
        input_schema: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "endpoint": {"type": "string", "description": "Nome do endpoint (parlamentares, servidores, contratos, ...)"},
                "formato": formato_schema(),
                "filters": {"type": "object", "description": "Filtros específicos do endpoint"},
                "passthrough": {"type": "boolean", "default": false, "description": "Permite endpoints fora do catálogo"}
            },
            "required": ["endpoint"]
        }),
    };

    let health = ToolDescriptor {
        name: "health_check".into(),
        description: "Verifica se a API da ALEPE está respondendo e mede a latência".into(),
        input_schema: json!({"type": "object", "additionalProperties": false, "properties": {}}),
    };

    let api_info = ToolDescriptor {
        name: "get_api_info".into(),
        description: "Informações sobre a API da ALEPE e a configuração deste servidor".into(),
        input_schema: json!({"type": "object", "additionalProperties": false, "properties": {}}),
    };

    vec![
        list_endpoints,
        parlamentares,
        servidores,
        contratos,
        licitacoes,
        remuneracao,
        cargos,
        lotacoes,
        search,
        health,
        api_info,
    ]
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchDataInput {
    pub endpoint: String,
    pub formato: Option<String>,
    pub filters: Option<Map<String, Value>>,
    pub passthrough: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct EndpointInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub available_filters: &'static [&'static str],
}

fn arguments_object(args: Value) -> Result<Map<String, Value>, ToolCallError> {
    match args {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        _ => Err(ToolCallError::InvalidParams(
            "arguments must be an object".into(),
        )),
    }
}

fn take_formato(args: &mut Map<String, Value>) -> Result<String, ToolCallError> {
    match args.remove("formato") {
        None | Some(Value::Null) => Ok(Format::Json.as_str().to_string()),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ToolCallError::InvalidParams(
            "formato must be a string".into(),
        )),
    }
}

fn envelope_output(envelope: &ResultEnvelope) -> Result<ToolOutput, ToolCallError> {
    Ok(ToolOutput {
        structured: serde_json::to_value(envelope)?,
        is_error: !envelope.is_success(),
    })
}

pub async fn call_tool(
    client: &AlepeClient,
    name: &str,
    args: Value,
) -> Result<ToolOutput, ToolCallError> {
    debug!("tools/call name={}", name);
    if let Some(endpoint) = dedicated_endpoint(name) {
        let mut args = arguments_object(args)?;
        let formato = take_formato(&mut args)?;
        if let Some(unexpected) = args.keys().find(|k| !endpoint.filters().contains(&k.as_str())) {
            return Err(ToolCallError::InvalidParams(format!(
                "unexpected argument '{}' for {}",
                unexpected, name
            )));
        }
        let envelope = fetch_known(client, endpoint, &formato, &args).await;
        return envelope_output(&envelope);
    }

    match name {
        "list_available_endpoints" => {
            let endpoints: Vec<EndpointInfo> = Endpoint::ALL
                .iter()
                .map(|e| EndpointInfo {
                    name: e.name(),
                    description: e.description(),
                    available_filters: e.filters(),
                })
                .collect();
            info!("listing {} endpoints", endpoints.len());
            Ok(ToolOutput::ok(json!({ "endpoints": endpoints })))
        }
        "search_data" => {
            let input: SearchDataInput = serde_json::from_value(args)
                .map_err(|e| ToolCallError::InvalidParams(e.to_string()))?;
            let envelope = search_data(client, input).await;
            envelope_output(&envelope)
        }
        "health_check" => {
            let report = client.health_check().await;
            info!("health check: {:?}", report.status);
            Ok(ToolOutput::ok(serde_json::to_value(report)?))
        }
        "get_api_info" => Ok(ToolOutput::ok(api_info(client))),
        other => Err(ToolCallError::UnknownTool(other.to_string())),
    }
}

async fn fetch_known(
    client: &AlepeClient,
    endpoint: Endpoint,
    formato: &str,
    raw: &Map<String, Value>,
) -> ResultEnvelope {
    match validators::validate_filters(&Target::Known(endpoint), raw) {
        Ok(filters) => client.request(endpoint.name(), formato, filters).await,
        Err(err) => ResultEnvelope::failure(&err),
    }
}

async fn search_data(client: &AlepeClient, input: SearchDataInput) -> ResultEnvelope {
    let formato = input.formato.unwrap_or_else(|| Format::Json.as_str().to_string());
    let raw = input.filters.unwrap_or_default();
    let prepared = RequestSpec::parse(
        &input.endpoint,
        &formato,
        Filters::new(),
        input.passthrough.unwrap_or(false),
    )
    .and_then(|spec| {
        let filters = validators::validate_filters(&spec.target, &raw)?;
        Ok::<_, ApiError>(spec.with_filters(filters))
    });
    match prepared {
        Ok(spec) => client.execute(&spec).await,
        Err(err) => ResultEnvelope::failure(&err),
    }
}

fn api_info(client: &AlepeClient) -> Value {
    let settings = client.settings();
    let endpoints: Map<String, Value> = Endpoint::ALL
        .iter()
        .map(|e| (e.name().to_string(), Value::from(e.description())))
        .collect();
    json!({
        "mcp_server": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "protocol": PROTOCOL_VERSION,
            "description": "Servidor MCP para acesso aos dados abertos da ALEPE"
        },
        "api_alepe": {
            "base_url": settings.base_url(),
            "supported_formats": Format::SUPPORTED,
            "available_endpoints": endpoints,
            "rate_limit": format!("{} requests/minute", settings.rate_limit()),
            "requests_in_current_window": client.rate_limiter().admitted_in_window()
        },
        "configuration": {
            "timeout_seconds": settings.timeout().as_secs_f64(),
            "max_retries": settings.max_retries(),
            "retry_delay_seconds": settings.retry_delay().as_secs_f64(),
            "user_agent": settings.user_agent(),
            "log_level": settings.log_level().as_str()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn offline_client() -> AlepeClient {
        // Port 9 (discard) is never dialed by these tests.
        let settings = Settings::from_lookup(|k| match k {
            "BASE_URL" => Some("http://127.0.0.1:9".into()),
            "MAX_RETRIES" => Some("0".into()),
            _ => None,
        })
        .unwrap();
        AlepeClient::new(settings).unwrap()
    }

    #[test]
    fn every_dedicated_tool_is_listed() {
        let names: Vec<String> = tool_descriptors().into_iter().map(|t| t.name).collect();
        for e in Endpoint::ALL {
            let tool = format!("get_{}", e.name());
            assert!(names.contains(&tool), "missing {tool}");
            assert_eq!(dedicated_endpoint(&tool), Some(e));
        }
        assert_eq!(names.len(), 11);
    }

    #[test]
    fn dedicated_schemas_declare_exactly_the_endpoint_filters() {
        for tool in tool_descriptors() {
            let Some(endpoint) = dedicated_endpoint(&tool.name) else {
                continue;
            };
            let props = tool.input_schema["properties"].as_object().unwrap();
            let mut declared: Vec<&str> = props.keys().map(String::as_str).collect();
            declared.sort_unstable();
            let mut expected: Vec<&str> = endpoint.filters().to_vec();
            expected.push("formato");
            expected.sort_unstable();
            assert_eq!(declared, expected, "{}", tool.name);
        }
    }

    #[tokio::test]
    async fn invalid_filter_value_fails_without_network() {
        let client = offline_client();
        let out = call_tool(
            &client,
            "get_parlamentares",
            json!({"situacao": "INVALID"}),
        )
        .await
        .unwrap();
        assert!(out.is_error);
        assert_eq!(out.structured["error"]["kind"], "validation_error");
        assert_eq!(client.rate_limiter().admitted_in_window(), 0);
    }

    #[tokio::test]
    async fn invalid_format_fails_without_network() {
        let client = offline_client();
        let out = call_tool(&client, "get_cargos", json!({"formato": "xml"}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.structured["error"]["message"]
            .as_str()
            .unwrap()
            .contains("'xml'"));
        assert_eq!(client.rate_limiter().admitted_in_window(), 0);
    }

    #[tokio::test]
    async fn unexpected_arguments_are_invalid_params() {
        let client = offline_client();
        let err = call_tool(&client, "get_cargos", json!({"ano": 2020}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidParams(_)));
        let err = call_tool(&client, "search_data", json!({"formato": "json"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolCallError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn search_data_rejects_unknown_endpoint_unless_passthrough() {
        let client = offline_client();
        let out = call_tool(&client, "search_data", json!({"endpoint": "deputados"}))
            .await
            .unwrap();
        assert!(out.is_error);
        assert!(out.structured["error"]["message"]
            .as_str()
            .unwrap()
            .contains("available endpoints"));
    }

    #[tokio::test]
    async fn catalogue_and_info_tools() {
        let client = offline_client();
        let out = call_tool(&client, "list_available_endpoints", Value::Null)
            .await
            .unwrap();
        let endpoints = out.structured["endpoints"].as_array().unwrap();
        assert_eq!(endpoints.len(), 7);
        assert_eq!(endpoints[0]["name"], "parlamentares");
        assert_eq!(
            endpoints[0]["available_filters"],
            json!(["partido", "situacao", "legislatura"])
        );

        let info = call_tool(&client, "get_api_info", json!({})).await.unwrap();
        assert_eq!(info.structured["api_alepe"]["base_url"], "http://127.0.0.1:9");
        assert_eq!(info.structured["configuration"]["max_retries"], 0);
        assert_eq!(info.structured["api_alepe"]["requests_in_current_window"], 0);
    }

    #[tokio::test]
    async fn unknown_tool() {
        let client = offline_client();
        let err = call_tool(&client, "get_deputados", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool not found: get_deputados");
    }
}
