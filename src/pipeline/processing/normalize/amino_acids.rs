use tracing::warn;

/// Stop / unknown residue marker
pub const STOP: char = '*';

const THREE_LETTER: [(&str, char); 22] = [
    ("ala", 'A'),
    ("arg", 'R'),
    ("asn", 'N'),
    ("asp", 'D'),
    ("cys", 'C'),
    ("gln", 'Q'),
    ("glu", 'E'),
    ("gly", 'G'),
    ("his", 'H'),
    ("ile", 'I'),
    ("leu", 'L'),
    ("lys", 'K'),
    ("met", 'M'),
    ("phe", 'F'),
    ("pro", 'P'),
    ("ser", 'S'),
    ("thr", 'T'),
    ("trp", 'W'),
    ("tyr", 'Y'),
    ("val", 'V'),
    ("sec", 'U'),
    ("pyl", 'O'),
];

/// Look up a three-letter residue code, ignoring case.
pub fn lookup(code: &str) -> Option<char> {
    let code = code.to_ascii_lowercase();
    THREE_LETTER
        .iter()
        .find(|(three, _)| *three == code)
        .map(|(_, one)| *one)
}

/// Convert a three-letter residue code to its one-letter form.
///
/// `Ter` and any unrecognised code become `*`. Unknown codes are logged, not raised.
pub fn to_one_letter(code: &str) -> char {
    match lookup(code) {
        Some(one) => one,
        None => {
            if !code.eq_ignore_ascii_case("ter") {
                warn!(code = %code, "Unknown residue code, substituting '*'");
            }
            STOP
        }
    }
}
