use serde::Deserialize;
use serde_json::Value;

/* {"code":0,"msg":"Success","data":{"access_token":"...","token_type":"bearer",...},"success":true} */
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub success: bool,
    pub msg: Option<String>,
    pub data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
pub struct TokenData {
    pub access_token: Option<String>,
}

impl TokenResponse {
    /// Non-empty token of a successful response.
    pub fn token(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.data
            .as_ref()
            .and_then(|data| data.access_token.as_deref())
            .filter(|token| !token.is_empty())
    }

    pub fn message(&self) -> &str {
        self.msg.as_deref().unwrap_or("Unknown error")
    }
}

/// Generic `{success, msg, data}` envelope shared by every data endpoint.
pub struct Envelope<'a> {
    value: &'a Value,
}

impl<'a> Envelope<'a> {
    pub fn new(value: &'a Value) -> Self {
        Envelope { value }
    }

    /// An explicit `"success": false` marks an API-level failure. Documents without the flag
    /// are judged by their HTTP status alone.
    pub fn is_failure(&self) -> bool {
        matches!(self.value.get("success").and_then(Value::as_bool), Some(false))
    }

    pub fn has_data(&self) -> bool {
        self.value.get("data").map_or(false, |data| !data.is_null())
    }

    pub fn message(&self) -> String {
        self.value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::read_resource;
    use serde_json::json;

    #[test]
    fn token_response() {
        let output: TokenResponse = serde_json::from_str(&read_resource("token.json")).unwrap();
        assert_eq!(Some("test-access-token"), output.token());
    }

    #[test]
    fn token_response_failed() {
        let output: TokenResponse =
            serde_json::from_str(&read_resource("token_failed.json")).unwrap();
        assert_eq!(None, output.token());
        assert_eq!("Incorrect username or password", output.message());
    }

    #[test]
    fn token_response_without_token() {
        let output: TokenResponse =
            serde_json::from_str(r#"{"success":true,"data":{"access_token":""}}"#).unwrap();
        assert_eq!(None, output.token());
        assert_eq!("Unknown error", output.message());
    }

    #[test]
    fn envelope_failure_flag() {
        let failed = json!({"success": false, "msg": "no permission", "data": null});
        let envelope = Envelope::new(&failed);
        assert!(envelope.is_failure());
        assert!(!envelope.has_data());
        assert_eq!("no permission", envelope.message());

        let flagless = json!({"data": {"soc": 76}});
        assert!(!Envelope::new(&flagless).is_failure());
        assert!(Envelope::new(&flagless).has_data());
    }
}
