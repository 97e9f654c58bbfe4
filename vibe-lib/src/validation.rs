/// checks that a string has no control characters, does not start or end
/// with whitespace and is at most `max_chars` characters long
pub fn check_control_leading_trailing<G>(
    given: G,
    max_chars: Option<usize>
) -> bool
where
    G: AsRef<str>
{
    let given_ref = given.as_ref();

    if let Some(ch) = given_ref.chars().next() {
        if ch.is_whitespace() {
            return false;
        }
    }

    if let Some(ch) = given_ref.chars().next_back() {
        if ch.is_whitespace() {
            return false;
        }
    }

    let mut char_count = 0;

    for ch in given_ref.chars() {
        if ch.is_control() {
            return false;
        }

        char_count += 1;

        if let Some(max) = max_chars {
            if char_count > max {
                return false;
            }
        }
    }

    true
}

/// checks that every character of a string passes `allowed` and that the
/// string is at most `max_chars` characters long
pub fn check_charset<G, F>(
    given: G,
    max_chars: Option<usize>,
    allowed: F,
) -> bool
where
    G: AsRef<str>,
    F: Fn(char) -> bool,
{
    let mut char_count = 0;

    for ch in given.as_ref().chars() {
        if !allowed(ch) {
            return false;
        }

        char_count += 1;

        if let Some(max) = max_chars {
            if char_count > max {
                return false;
            }
        }
    }

    true
}
