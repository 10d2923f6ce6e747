/// Configuration macro for single-declaration config structs
///
/// `config_struct!` takes each field's name, type and default value in one
/// place and generates:
/// - the struct with public fields
/// - the `Default` implementation
/// - serde support with `#[serde(default)]`, so partial TOML files load
///
/// # Example
/// ```
/// chama_cache::config_struct! {
///     pub struct PollConfig {
///         interval_ms: u64 = 2_000,
///         enabled: bool = true,
///     }
/// }
///
/// let poll = PollConfig::default();
/// assert_eq!(poll.interval_ms, 2_000);
/// ```
#[macro_export]
macro_rules! config_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_name:ident: $field_type:ty = $default_value:expr
            ),*
            $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(default)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                pub $field_name: $field_type,
            )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    $(
                        $field_name: $default_value,
                    )*
                }
            }
        }
    };
}
