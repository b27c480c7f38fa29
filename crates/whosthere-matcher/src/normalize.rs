/// Case-folds, trims, and collapses runs of whitespace to a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(word.chars().flat_map(char::to_lowercase));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::normalize;

    #[test]
    fn trims_and_collapses() {
        assert_eq!(normalize("  Open \t  SESAME \n"), "open sesame");
    }

    #[test]
    fn blank_becomes_empty() {
        assert_eq!(normalize(" \t\n "), "");
    }

    #[test]
    fn folds_non_ascii() {
        assert_eq!(normalize("ÖFFNE DICH"), "öffne dich");
    }
}
