use std::collections::BTreeMap;

/// Parameter name the signature is sent under.
pub const SIGNATURE_KEY: &str = "api_sig";

/// Signs Last.fm calls: md5 over the sorted `key` + `value` pairs followed by
/// the shared secret, rendered as uppercase hex.
#[derive(Clone)]
pub struct RequestSigner {
    secret: String,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").finish_non_exhaustive()
    }
}

impl RequestSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// `BTreeMap<String, _>` iterates in byte-wise key order, which is the
    /// ordering the service expects.
    pub fn sign(&self, params: &BTreeMap<String, String>) -> String {
        let mut payload = String::new();
        for (key, value) in params {
            if key == SIGNATURE_KEY || key == "format" || key == "callback" {
                continue;
            }
            payload.push_str(key);
            payload.push_str(value);
        }
        payload.push_str(&self.secret);

        format!("{:X}", md5::compute(payload.as_bytes()))
    }

    /// Adds `api_sig` to the parameter set.
    pub fn append_signature(&self, params: &mut BTreeMap<String, String>) {
        let signature = self.sign(params);
        params.insert(SIGNATURE_KEY.to_string(), signature);
    }
}
