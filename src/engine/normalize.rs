//! Name canonicalization so that the same team or game written by different
//! sources lands on the same key.

/// Canonical key for a team / side name.
///
/// "Tulane Green Wave +17.5" -> "TULANE GREEN WAVE", "Saint Mary's" -> "ST MARY'S",
/// "over" -> "OVER".
pub fn normalize_side(name: &str) -> String {
    let mut s = name.to_uppercase();
    s = s.replace("SAINT", "ST");
    s = s.replace('&', "AND");
    s = s.replace('.', " ");

    let mut words: Vec<&str> = s.split_whitespace().collect();
    // Trailing line token, e.g. "-3.5" (dots already split: "-3", "5") or "+7".
    while let Some(last) = words.last() {
        if is_line_token(last) && words.len() > 1 {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}

/// Line written into the side text, e.g. "Team A -3.5" -> -3.5, "Over 221" -> 221.
pub fn side_line(name: &str) -> Option<f64> {
    let mut words = name.split_whitespace();
    let last = words.next_back()?;
    words.next_back()?;
    let first = last.chars().next()?;
    if !(first == '+' || first == '-' || first.is_ascii_digit()) {
        return None;
    }
    last.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_line_token(token: &str) -> bool {
    let digits = token.trim_start_matches(['+', '-']);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Canonical key for a game label such as "Memphis Grizzlies @ Washington Wizards".
pub fn normalize_game(game_id: &str) -> String {
    game_id
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Loose team match: one canonical name contains the other on a word boundary.
/// Lets "Boston" (Kalshi) match "Boston Celtics" (sportsbooks).
pub fn team_matches(a: &str, b: &str) -> bool {
    let a = normalize_side(a);
    let b = normalize_side(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    long.starts_with(&format!("{short} ")) || long.ends_with(&format!(" {short}"))
}
