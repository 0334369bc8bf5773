//! Standard Type 1 fonts
//!
//! Glyph widths come from the Adobe AFM metrics of Helvetica and
//! Helvetica-Bold, in thousandths of the font size. Text is written with
//! WinAnsiEncoding.

/// Font resource used by a text run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    /// Resource name in the page dictionary
    pub fn resource(&self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    pub fn base_font(&self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }
}

/// Widths of ' ' (0x20) through '~' (0x7E)
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // '0'..'?'
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 'P'..'_'
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // '`'..'o'
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 'p'..'~'
];

/// ASCII letter whose glyph width an accented Latin-1 letter shares
fn base_letter(c: char) -> Option<char> {
    let base = match c {
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' | 'Ø' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' => 'Y',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(base)
}

/// Width of one character in thousandths of the font size
pub fn glyph_width(c: char, font: Font) -> u16 {
    let table = match font {
        Font::Regular => &HELVETICA,
        Font::Bold => &HELVETICA_BOLD,
    };
    let ascii = |c: char| table[(c as usize) - 0x20];

    match c {
        ' '..='~' => ascii(c),
        '\t' | '\u{a0}' | '\u{202f}' => ascii(' '),
        '°' => 400,
        '€' | '«' | '»' => 556,
        '‘' | '’' => match font {
            Font::Regular => 222,
            Font::Bold => 278,
        },
        '–' => 556,
        '—' | '…' | 'Œ' | 'Æ' => 1000,
        'œ' => 944,
        'æ' => 889,
        'ß' => 611,
        '•' => 350,
        _ => base_letter(c).map(ascii).unwrap_or(556),
    }
}

/// Width of `text` in points at `size`
pub fn text_width(text: &str, font: Font, size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| glyph_width(c, font) as u32).sum();
    units as f32 * size / 1000.0
}

/// Encode `text` as WinAnsi bytes; characters outside the code page become '?'
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\t' | '\u{202f}' => b' ',
            '€' => 0x80,
            '…' => 0x85,
            'Œ' => 0x8C,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            'œ' => 0x9C,
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_widths() {
        assert_eq!(glyph_width(' ', Font::Regular), 278);
        assert_eq!(glyph_width('W', Font::Regular), 944);
        assert_eq!(glyph_width('~', Font::Bold), 584);
        assert_eq!(glyph_width('b', Font::Bold), 611);
        assert!((text_width("0000", Font::Regular, 10.0) - 22.24).abs() < 1e-4);
    }

    #[test]
    fn test_accented_letters_use_base_width() {
        assert_eq!(glyph_width('é', Font::Regular), glyph_width('e', Font::Regular));
        assert_eq!(glyph_width('É', Font::Bold), glyph_width('E', Font::Bold));
    }

    #[test]
    fn test_win_ansi_encoding() {
        assert_eq!(encode_win_ansi("Réf 12 €"), vec![b'R', 0xE9, b'f', b' ', b'1', b'2', b' ', 0x80]);
        assert_eq!(encode_win_ansi("-18 °C"), vec![b'-', b'1', b'8', b' ', 0xB0, b'C']);
        assert_eq!(encode_win_ansi("Ж"), vec![b'?']);
    }
}
