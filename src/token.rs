use rand::Rng;

/// Smallest token handed out
pub const TOKEN_MIN: u16 = 1000;
/// Largest token handed out
pub const TOKEN_MAX: u16 = 9999;

/// Generate a 4-digit order token
///
/// Tokens are read out at the counter, nothing more. They are not checked
/// against earlier orders, so two orders may share one.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    rng.gen_range(TOKEN_MIN..=TOKEN_MAX).to_string()
}
