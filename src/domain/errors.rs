// Credential errors are owned and displayed by the widget; the screens never
// see them. Everything else in the error taxonomy is either treated as
// "signed out" (session checks) or logged and swallowed (mutations).
#[derive(Debug, PartialEq, Eq)]
pub enum CredentialError {
    InvalidCredentials,
    EmailTaken,
    UpstreamUnavailable,
}

impl CredentialError {
    // Message shown inside the widget's own error area.
    pub fn message(&self) -> &'static str {
        match self {
            CredentialError::InvalidCredentials => "invalid email or password",
            CredentialError::EmailTaken => "an account with this email already exists",
            CredentialError::UpstreamUnavailable => "sign-in service unavailable",
        }
    }
}
