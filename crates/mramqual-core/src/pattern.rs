//! Test pattern generation
//!
//! A [`PatternGenerator`] writes successive memory words of one pattern
//! family into a buffer. Solid and checkerboard patterns depend only on the
//! word index; walking-bit patterns carry a [`WalkState`] that advances once
//! per word and persists across buffers of the same stage.

/// Solid pattern with every bit set (the erased state)
pub const SOLID_ONES: u8 = 0xFF;
/// Solid pattern with every bit cleared
pub const SOLID_ZEROS: u8 = 0x00;
/// Checkerboard byte used on even words
pub const CHECKERBOARD: u8 = 0x55;
/// Checkerboard byte used on odd words
pub const INVERSE_CHECKERBOARD: u8 = 0xAA;

/// Pattern families used by calibration and qualification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Every byte 0xFF
    SolidAll1,
    /// Every byte 0x00
    SolidAll0,
    /// 0x55 on even words, 0xAA on odd words
    Checkerboard,
    /// 0xAA on even words, 0x55 on odd words
    InverseCheckerboard,
    /// One set bit per word on a background of zeros
    WalkingOne,
    /// One cleared bit per word on a background of ones
    WalkingZero,
}

impl Pattern {
    /// Short name used in logs and reports
    pub fn name(self) -> &'static str {
        match self {
            Self::SolidAll1 => "solid-1",
            Self::SolidAll0 => "solid-0",
            Self::Checkerboard => "ckbd",
            Self::InverseCheckerboard => "ickbd",
            Self::WalkingOne => "walking-1",
            Self::WalkingZero => "walking-0",
        }
    }

    /// Whether this pattern carries walking-bit state
    pub fn is_walking(self) -> bool {
        matches!(self, Self::WalkingOne | Self::WalkingZero)
    }

    /// Byte value at `byte` of word `word` for the given walking state
    ///
    /// Pure function of its arguments: identical inputs always give the
    /// same value.
    pub fn byte_at(self, word: u32, byte: usize, state: WalkState, word_size: usize) -> u8 {
        match self {
            Self::SolidAll1 => SOLID_ONES,
            Self::SolidAll0 => SOLID_ZEROS,
            Self::Checkerboard => checkerboard_byte(word, false),
            Self::InverseCheckerboard => checkerboard_byte(word, true),
            Self::WalkingOne => {
                let (target, mask) = state.target(word_size);
                if byte == target {
                    mask
                } else {
                    SOLID_ZEROS
                }
            }
            Self::WalkingZero => {
                let (target, mask) = state.target(word_size);
                if byte == target {
                    !mask
                } else {
                    SOLID_ONES
                }
            }
        }
    }
}

fn checkerboard_byte(word: u32, inverse: bool) -> u8 {
    let even = word % 2 == 0;
    if even != inverse {
        CHECKERBOARD
    } else {
        INVERSE_CHECKERBOARD
    }
}

/// Walking-bit position state
///
/// `word_shift` advances once per generated word; when it reaches the word's
/// bit width it wraps and `row_shift` advances, which itself wraps at the
/// same count. The marked bit is `(word_shift + row_shift) % bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalkState {
    /// Position within the current row of words
    pub word_shift: u32,
    /// Row offset added to every word of the row
    pub row_shift: u32,
}

impl WalkState {
    /// State at the start of a stage
    pub const START: Self = Self {
        word_shift: 0,
        row_shift: 0,
    };

    /// Bit index within the word (0 = MSB of the last byte)
    pub fn position(self, word_size: usize) -> u32 {
        let bits = (word_size * 8) as u32;
        (self.word_shift + self.row_shift) % bits
    }

    /// Target byte index and the single-bit mask for that byte
    pub fn target(self, word_size: usize) -> (usize, u8) {
        let position = self.position(word_size);
        let byte = word_size - 1 - (position / 8) as usize;
        let mask = 0x80u8 >> (position % 8);
        (byte, mask)
    }

    /// Advance by one word
    pub fn advance(&mut self, word_size: usize) {
        let entries = (word_size * 8) as u32;
        self.word_shift += 1;
        if self.word_shift == entries {
            self.word_shift = 0;
            self.row_shift += 1;
        }
        if self.row_shift == entries {
            self.row_shift = 0;
        }
    }
}

/// Stateful generator for one pattern family
#[derive(Debug, Clone)]
pub struct PatternGenerator {
    pattern: Pattern,
    word_size: usize,
    word: u32,
    walk: WalkState,
}

impl PatternGenerator {
    /// Create a generator starting at word 0 with the walking state at
    /// [`WalkState::START`]
    pub fn new(pattern: Pattern, word_size: usize) -> Self {
        Self {
            pattern,
            word_size,
            word: 0,
            walk: WalkState::START,
        }
    }

    /// Resume a generator from a previously saved walking state
    pub fn with_state(pattern: Pattern, word_size: usize, walk: WalkState) -> Self {
        Self {
            walk,
            ..Self::new(pattern, word_size)
        }
    }

    /// Pattern being generated
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    /// Current walking state
    pub fn state(&self) -> WalkState {
        self.walk
    }

    /// Number of words generated so far
    pub fn words_generated(&self) -> u32 {
        self.word
    }

    /// Byte the generator would emit at `byte_index` of word `word_index`
    /// given its current walking state
    pub fn expected_byte(&self, word_index: u32, byte_index: usize) -> u8 {
        self.pattern
            .byte_at(word_index, byte_index, self.walk, self.word_size)
    }

    /// Fill one word and advance
    pub fn fill_word(&mut self, word: &mut [u8]) {
        for (i, byte) in word.iter_mut().enumerate() {
            *byte = self
                .pattern
                .byte_at(self.word, i, self.walk, self.word_size);
        }
        self.word = self.word.wrapping_add(1);
        if self.pattern.is_walking() {
            self.walk.advance(self.word_size);
        }
    }

    /// Fill `buf` with the next `buf.len() / word_size` words
    ///
    /// A trailing partial word is left untouched.
    pub fn fill(&mut self, buf: &mut [u8]) {
        for word in buf.chunks_exact_mut(self.word_size) {
            self.fill_word(word);
        }
    }
}
