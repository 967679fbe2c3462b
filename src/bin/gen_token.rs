use crm_server::auth::{generate_access_token, hash_access_token};

fn main() {
    let token = match std::env::args().nth(1) {
        Some(t) => t,
        None => generate_access_token(),
    };
    println!("token:               {token}");
    println!("CRM_API_TOKEN_SHA256={}", hash_access_token(&token));
}
