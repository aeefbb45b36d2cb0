use anyhow::{Result, anyhow};

pub fn validate_email_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(anyhow!("Email address cannot be empty"));
    }

    if address.len() > 254 {
        return Err(anyhow!("Email address too long (maximum 254 characters)"));
    }

    if address.chars().any(char::is_whitespace) {
        return Err(anyhow!("Email address contains whitespace"));
    }

    let (local, domain) = address
        .rsplit_once('@')
        .ok_or_else(|| anyhow!("Email address is missing '@'"))?;

    if local.is_empty() || domain.is_empty() {
        return Err(anyhow!("Email address has an empty local part or domain"));
    }

    if !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.') {
        return Err(anyhow!("Email address domain is invalid"));
    }

    Ok(())
}
