// demos/basic_workflow.rs

use p256_challenge_auth::{
    signer::{RemoteSigner, SoftwareSigner},
    AuthConfig, AuthService, AuthenticationFinish, EnrollmentFinish, MemoryKeyStore,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    println!("P-256 Challenge Auth Basic Workflow");

    // 1. Setup authentication service with a per-process signing key
    let config = AuthConfig::default();
    let domain = config.domain.clone();
    let service = AuthService::new(config, Arc::new(MemoryKeyStore::new()))?;

    // 2. The signing party; a real deployment talks to an external one
    let mut signer = SoftwareSigner::new();

    // 3. Enrollment
    println!("\nEnrolling alice...");
    let ticket = service.enrollment_start()?;
    println!("Challenge token: {}...", &ticket.token[..40]);

    let signed = RemoteSigner::new(&mut signer).sign(&domain, ticket.challenge()?.as_bytes(), true)?;
    let public_key = signed
        .public_key
        .ok_or("signer did not return its public key")?;

    let record = service.enrollment_finish(EnrollmentFinish {
        token: ticket.token,
        username: "alice".to_string(),
        signature: signed.signature,
        public_key,
    })?;
    println!("Enrolled {} with key {}", record.username, record.public_key.key_hash());

    // 4. Authentication
    println!("\nAuthenticating alice...");
    let ticket = service.authentication_start("alice")?;
    let signed = RemoteSigner::new(&mut signer).sign(&domain, ticket.challenge()?.as_bytes(), false)?;

    let credential = service.authentication_finish(AuthenticationFinish {
        token: ticket.token,
        signature: signed.signature,
    })?;
    println!("Authentication successful!");
    println!("   Session ID: {}", credential.session_id);
    println!("   Expires at: {}", credential.expires_at);

    // 5. Session validation
    let claims = service.validate_session(&credential.session_token)?;
    println!("\nSession valid for {} (key {})", claims.username, claims.key_hash);

    // 6. A user with no enrolled key
    let ticket = service.authentication_start("mallory")?;
    let signed = RemoteSigner::new(&mut signer).sign(&domain, ticket.challenge()?.as_bytes(), false)?;
    match service.authentication_finish(AuthenticationFinish {
        token: ticket.token,
        signature: signed.signature,
    }) {
        Ok(_) => println!("Unexpected success for mallory"),
        Err(e) => println!("mallory rejected (expected): {}", e),
    }

    println!("\nExample completed!");
    Ok(())
}
