use url::Url;

// Static provider registration used to build the authorization request.
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub authorize_endpoint: Url,
    // Public client identifier, not a secret.
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

// Build the provider authorization URL. `state` only reduces replay ambiguity
// between attempts; it is a timestamp and is never verified.
pub fn build_authorize_url(settings: &ProviderSettings, state: u64) -> Url {
    let mut url = settings.authorize_endpoint.clone();
    url.query_pairs_mut()
        .append_pair("client_id", &settings.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &settings.redirect_uri)
        .append_pair("scope", &settings.scopes.join(" "))
        .append_pair("response_mode", "query")
        .append_pair("state", &state.to_string());
    url
}
