/// Cache key builders for chama and user data
///
/// Keys are colon-delimited: `chama:<operation>:<address>[:<param>...]`.
/// Addresses are used verbatim, so callers that mix checksummed and
/// lowercase addresses get distinct keys.

pub fn create_chama_data_key(operation: &str, chama_address: &str, params: &[&str]) -> String {
    build_key("chama", operation, chama_address, params)
}

pub fn create_user_data_key(operation: &str, user_address: &str, params: &[&str]) -> String {
    build_key("user", operation, user_address, params)
}

fn build_key(scope: &str, operation: &str, address: &str, params: &[&str]) -> String {
    let mut key = format!("{}:{}:{}", scope, operation, address);
    for param in params {
        key.push(':');
        key.push_str(param);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chama_key_without_params() {
        assert_eq!(
            create_chama_data_key("info", "0xABC123", &[]),
            "chama:info:0xABC123"
        );
    }

    #[test]
    fn test_user_key_with_params() {
        assert_eq!(
            create_user_data_key("contribution", "0xdef", &["round", "3"]),
            "user:contribution:0xdef:round:3"
        );
    }
}
