use crate::core::{
    errors::{AppError, AppResult},
    types::Provider,
};

const SERVICE: &str = "bidlens";

fn username_for_provider(provider: &Provider) -> &'static str {
    match provider {
        Provider::Gemini => "gemini",
    }
}

fn env_var_for_provider(provider: &Provider) -> &'static str {
    match provider {
        Provider::Gemini => "GEMINI_API_KEY",
    }
}

pub fn set_provider_key(provider: Provider, api_key: &str) -> AppResult<()> {
    let entry = keyring::Entry::new(SERVICE, username_for_provider(&provider))
        .map_err(|err| AppError::Internal(err.to_string()))?;
    entry
        .set_password(api_key)
        .map_err(|err| AppError::Internal(err.to_string()))
}

/// Environment first, then the OS keyring.
pub fn get_provider_key(provider: Provider) -> AppResult<String> {
    get_provider_key_with(provider, |key| std::env::var(key).ok())
}

pub fn get_provider_key_with<F>(provider: Provider, lookup: F) -> AppResult<String>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(env_var_for_provider(&provider)).filter(|key| !key.trim().is_empty()) {
        return Ok(key.trim().to_string());
    }
    let entry = keyring::Entry::new(SERVICE, username_for_provider(&provider))
        .map_err(|err| AppError::Internal(err.to_string()))?;
    entry
        .get_password()
        .map_err(|_err| AppError::ProviderAuth)
}

#[cfg(test)]
mod tests {
    use super::get_provider_key_with;
    use crate::core::types::Provider;

    #[test]
    fn environment_key_takes_precedence() {
        let key = get_provider_key_with(Provider::Gemini, |name| {
            (name == "GEMINI_API_KEY").then(|| " secret ".to_string())
        })
        .expect("key from env");
        assert_eq!(key, "secret");
    }
}
