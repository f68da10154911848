//! Leaf value checking against built-in YANG types.

use canopy_yang::{TypeSpec, YangSpec};

/// Check a textual value against a type constraint.
///
/// Returns the violation reason on failure. Leafrefs always pass here;
/// their referential check needs the data tree and lives in the
/// checker.
pub fn check_value(spec: &YangSpec, ty: &TypeSpec, value: &str) -> Result<(), String> {
    match ty {
        TypeSpec::Integer { min, max } => {
            let n: i128 = value
                .trim()
                .parse()
                .map_err(|_| format!("{:?} is not an integer", value))?;
            if n < *min || n > *max {
                return Err(format!("{} out of range [{}, {}]", n, min, max));
            }
            Ok(())
        }
        TypeSpec::Decimal64 {
            fraction_digits,
            min,
            max,
        } => {
            let trimmed = value.trim();
            let n: f64 = trimmed
                .parse()
                .map_err(|_| format!("{:?} is not a decimal", value))?;
            if let Some(frac) = trimmed.split('.').nth(1) {
                if frac.len() > *fraction_digits as usize {
                    return Err(format!(
                        "{:?} exceeds {} fraction digits",
                        value, fraction_digits
                    ));
                }
            }
            if min.map(|m| n < m).unwrap_or(false) || max.map(|m| n > m).unwrap_or(false) {
                return Err(format!("{} out of range", n));
            }
            Ok(())
        }
        TypeSpec::Boolean => match value {
            "true" | "false" => Ok(()),
            _ => Err(format!("{:?} is not a boolean", value)),
        },
        TypeSpec::Empty => {
            if value.is_empty() {
                Ok(())
            } else {
                Err("empty leaf cannot carry a value".to_string())
            }
        }
        TypeSpec::Str {
            min_len,
            max_len,
            patterns,
        } => {
            let len = value.chars().count() as u64;
            if min_len.map(|m| len < m).unwrap_or(false) {
                return Err(format!("length {} below minimum {}", len, min_len.unwrap_or(0)));
            }
            if max_len.map(|m| len > m).unwrap_or(false) {
                return Err(format!("length {} above maximum {}", len, max_len.unwrap_or(0)));
            }
            for pattern in patterns {
                let anchored = format!("^(?:{})$", pattern);
                let re = regex::Regex::new(&anchored)
                    .map_err(|e| format!("unusable pattern {:?}: {}", pattern, e))?;
                if !re.is_match(value) {
                    return Err(format!("{:?} does not match pattern {:?}", value, pattern));
                }
            }
            Ok(())
        }
        TypeSpec::Enumeration(names) => {
            if names.iter().any(|n| n == value) {
                Ok(())
            } else {
                Err(format!("{:?} is not one of the enumeration", value))
            }
        }
        TypeSpec::Bits(names) => {
            let mut seen = Vec::new();
            for bit in value.split_whitespace() {
                if !names.iter().any(|n| n == bit) {
                    return Err(format!("{:?} is not an allowed bit", bit));
                }
                if seen.contains(&bit) {
                    return Err(format!("bit {:?} set twice", bit));
                }
                seen.push(bit);
            }
            Ok(())
        }
        TypeSpec::IdentityRef { base } => {
            if spec.identity_derived_from(value, base) {
                Ok(())
            } else {
                Err(format!("{:?} is not derived from identity {:?}", value, base))
            }
        }
        TypeSpec::LeafRef { .. } => Ok(()),
        TypeSpec::Union(alternatives) => {
            for alt in alternatives {
                if check_value(spec, alt, value).is_ok() {
                    return Ok(());
                }
            }
            Err(format!("{:?} matches no union alternative", value))
        }
    }
}
