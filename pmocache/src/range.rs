//! Interprétation de l'en-tête HTTP `Range`

/// Résultat de l'analyse d'un en-tête `Range` pour une ressource de
/// `size` octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// Intervalle inclusif `[start, end]`
    Satisfiable { start: u64, end: u64 },
    /// Syntaxe valide mais hors de la ressource : 416
    Unsatisfiable,
    /// En-tête ignoré : la ressource complète est servie
    Malformed,
}

impl ByteRange {
    /// Analyse `bytes=a-b`, `bytes=a-` et `bytes=-n`
    ///
    /// Les demandes multi-intervalles sont traitées comme mal formées.
    pub fn parse(header: &str, size: u64) -> ByteRange {
        let Some(spec) = header.trim().strip_prefix("bytes=") else {
            return ByteRange::Malformed;
        };
        if spec.contains(',') {
            return ByteRange::Malformed;
        }
        let Some((start_str, end_str)) = spec.trim().split_once('-') else {
            return ByteRange::Malformed;
        };

        match (start_str.trim(), end_str.trim()) {
            ("", "") => ByteRange::Malformed,
            ("", suffix) => match suffix.parse::<u64>() {
                Ok(0) => ByteRange::Unsatisfiable,
                Ok(_) if size == 0 => ByteRange::Unsatisfiable,
                Ok(n) => ByteRange::Satisfiable {
                    start: size.saturating_sub(n),
                    end: size - 1,
                },
                Err(_) => ByteRange::Malformed,
            },
            (start, end) => {
                let Ok(start) = start.parse::<u64>() else {
                    return ByteRange::Malformed;
                };
                let end = if end.is_empty() {
                    None
                } else {
                    match end.parse::<u64>() {
                        Ok(e) if e >= start => Some(e),
                        _ => return ByteRange::Malformed,
                    }
                };

                if start >= size {
                    return ByteRange::Unsatisfiable;
                }
                ByteRange::Satisfiable {
                    start,
                    end: end.map_or(size - 1, |e| e.min(size - 1)),
                }
            }
        }
    }
}
