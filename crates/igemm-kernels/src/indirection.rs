//! Indirection buffers: per-tap row references into an input arena.
//!
//! An IGEMM kernel never sees a contiguous A matrix. It walks `mr * ks`
//! row references laid out tap-major (`rows[tap * mr + row]`), where each
//! entry either names a position in the caller's input arena or stands for
//! implicit padding. Padding rows read a shared buffer filled with the
//! activation zero point and are never displaced by the caller's offset.

use igemm_common::{KernelError, Result, divide_round_up};

/// One entry of an indirection buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectRow {
    /// Row starting at `position + offset` in the input arena.
    Input(usize),
    /// Padding: read the zero buffer.
    Zero,
}

/// Borrowed view a kernel reads operand A through.
#[derive(Debug, Clone, Copy)]
pub struct IndirectA<'a> {
    pub rows: &'a [IndirectRow],
    pub input: &'a [u8],
    pub zero: &'a [u8],
    pub offset: usize,
}

impl<'a> IndirectA<'a> {
    pub fn new(rows: &'a [IndirectRow], input: &'a [u8], zero: &'a [u8], offset: usize) -> Self {
        Self { rows, input, zero, offset }
    }

    /// Bytes available from the start of row `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds or an `Input` row starts past the
    /// end of the arena. Kernels call [`IndirectA::validate`] first.
    pub fn row(&self, index: usize) -> &'a [u8] {
        match self.rows[index] {
            IndirectRow::Input(position) => &self.input[position + self.offset..],
            IndirectRow::Zero => self.zero,
        }
    }

    /// Check that the first `mr * ks` rows exist and each holds `kc` bytes.
    pub fn validate(&self, mr: usize, ks: usize, kc: usize) -> Result<()> {
        let required = mr * ks;
        if self.rows.len() < required {
            return Err(KernelError::BufferTooSmall {
                what: "indirection buffer",
                required,
                actual: self.rows.len(),
            }
            .into());
        }
        for row in &self.rows[..required] {
            let available = match *row {
                IndirectRow::Input(position) => {
                    self.input.len().saturating_sub(position.saturating_add(self.offset))
                }
                IndirectRow::Zero => self.zero.len(),
            };
            if available < kc {
                let what = match row {
                    IndirectRow::Input(_) => "indirect input row",
                    IndirectRow::Zero => "zero buffer",
                };
                return Err(KernelError::BufferTooSmall { what, required: kc, actual: available }.into());
            }
        }
        Ok(())
    }
}

// ── 2-D convolution ──────────────────────────────────────────────────────────

/// Shape of an NHWC 2-D convolution over a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dGeometry {
    pub input_height: usize,
    pub input_width: usize,
    /// Distance in bytes between consecutive input pixels.
    pub input_pixel_stride: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub subsampling_height: usize,
    pub subsampling_width: usize,
    pub dilation_height: usize,
    pub dilation_width: usize,
    pub padding_top: usize,
    pub padding_right: usize,
    pub padding_bottom: usize,
    pub padding_left: usize,
}

impl Default for Conv2dGeometry {
    fn default() -> Self {
        Self {
            input_height: 1,
            input_width: 1,
            input_pixel_stride: 1,
            kernel_height: 1,
            kernel_width: 1,
            subsampling_height: 1,
            subsampling_width: 1,
            dilation_height: 1,
            dilation_width: 1,
            padding_top: 0,
            padding_right: 0,
            padding_bottom: 0,
            padding_left: 0,
        }
    }
}

impl Conv2dGeometry {
    pub fn kernel_size(&self) -> usize {
        self.kernel_height * self.kernel_width
    }

    pub fn output_height(&self) -> usize {
        output_dimension(
            self.padding_top + self.input_height + self.padding_bottom,
            self.kernel_height,
            self.dilation_height,
            self.subsampling_height,
        )
    }

    pub fn output_width(&self) -> usize {
        output_dimension(
            self.padding_left + self.input_width + self.padding_right,
            self.kernel_width,
            self.dilation_width,
            self.subsampling_width,
        )
    }

    pub fn output_size(&self) -> usize {
        self.output_height() * self.output_width()
    }

    fn validate(&self) -> Result<()> {
        let fields = [
            ("input height", self.input_height),
            ("input width", self.input_width),
            ("kernel height", self.kernel_height),
            ("kernel width", self.kernel_width),
            ("subsampling height", self.subsampling_height),
            ("subsampling width", self.subsampling_width),
            ("dilation height", self.dilation_height),
            ("dilation width", self.dilation_width),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| *v == 0) {
            return Err(KernelError::InvalidGeometry { reason: format!("{name} must be non-zero") }.into());
        }
        if self.output_size() == 0 {
            return Err(KernelError::InvalidGeometry {
                reason: format!(
                    "{}x{} kernel (dilation {}x{}) does not fit the padded {}x{} input",
                    self.kernel_height,
                    self.kernel_width,
                    self.dilation_height,
                    self.dilation_width,
                    self.padding_top + self.input_height + self.padding_bottom,
                    self.padding_left + self.input_width + self.padding_right,
                ),
            }
            .into());
        }
        Ok(())
    }
}

fn output_dimension(padded: usize, kernel: usize, dilation: usize, subsampling: usize) -> usize {
    let effective = (kernel - 1) * dilation + 1;
    if padded < effective { 0 } else { (padded - effective) / subsampling + 1 }
}

/// Indirection buffer for a whole convolution, split into `mr`-row tiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conv2dIndirection {
    pub rows: Vec<IndirectRow>,
    pub mr: usize,
    pub ks: usize,
    pub output_size: usize,
}

impl Conv2dIndirection {
    pub fn tile_count(&self) -> usize {
        divide_round_up(self.output_size, self.mr)
    }

    /// The `mr * ks` rows feeding output pixels `tile * mr ..`.
    pub fn tile(&self, tile: usize) -> &[IndirectRow] {
        let len = self.mr * self.ks;
        &self.rows[tile * len..(tile + 1) * len]
    }
}

/// Build the indirection buffer of a 2-D convolution for `mr`-row tiles.
///
/// Taps that land in the padding become [`IndirectRow::Zero`]. The last
/// tile repeats its final output pixel when the output size is not a
/// multiple of `mr`.
pub fn conv2d_indirection(geometry: &Conv2dGeometry, mr: usize) -> Result<Conv2dIndirection> {
    if mr == 0 {
        return Err(KernelError::InvalidGeometry { reason: "mr must be non-zero".to_string() }.into());
    }
    geometry.validate()?;

    let output_width = geometry.output_width();
    let output_size = geometry.output_size();
    let ks = geometry.kernel_size();
    let tiled_output_size = divide_round_up(output_size, mr) * mr;
    let mut rows = vec![IndirectRow::Zero; tiled_output_size * ks];

    for tile_start in (0..tiled_output_size).step_by(mr) {
        for tile_offset in 0..mr {
            let output_index = (tile_start + tile_offset).min(output_size - 1);
            let output_y = output_index / output_width;
            let output_x = output_index % output_width;
            for kernel_y in 0..geometry.kernel_height {
                let input_y = (output_y * geometry.subsampling_height
                    + kernel_y * geometry.dilation_height)
                    .checked_sub(geometry.padding_top)
                    .filter(|&y| y < geometry.input_height);
                for kernel_x in 0..geometry.kernel_width {
                    let input_x = (output_x * geometry.subsampling_width
                        + kernel_x * geometry.dilation_width)
                        .checked_sub(geometry.padding_left)
                        .filter(|&x| x < geometry.input_width);
                    let tap = kernel_y * geometry.kernel_width + kernel_x;
                    let index = tile_start * ks + tap * mr + tile_offset;
                    rows[index] = match (input_y, input_x) {
                        (Some(y), Some(x)) => {
                            IndirectRow::Input((y * geometry.input_width + x) * geometry.input_pixel_stride)
                        }
                        _ => IndirectRow::Zero,
                    };
                }
            }
        }
    }

    log::trace!(
        "conv2d indirection: {}x{} output, ks={}, {} rows",
        geometry.output_height(),
        output_width,
        ks,
        rows.len()
    );
    Ok(Conv2dIndirection { rows, mr, ks, output_size })
}

#[cfg(test)]
mod tests {
    use super::*;
    use igemm_common::IgemmError;

    #[test]
    fn zero_rows_ignore_offset() {
        let input = [1u8, 2, 3, 4, 5, 6];
        let zero = [9u8, 9];
        let rows = [IndirectRow::Input(0), IndirectRow::Zero, IndirectRow::Input(2)];
        let a = IndirectA::new(&rows, &input, &zero, 1);
        assert_eq!(&a.row(0)[..2], &[2, 3]);
        assert_eq!(a.row(1), &[9, 9]);
        assert_eq!(&a.row(2)[..2], &[4, 5]);
    }

    #[test]
    fn validate_rejects_short_rows() {
        let input = [0u8; 4];
        let zero = [0u8; 2];
        let rows = [IndirectRow::Input(2), IndirectRow::Zero];
        let a = IndirectA::new(&rows, &input, &zero, 0);
        assert!(a.validate(2, 1, 2).is_ok());
        assert!(matches!(
            a.validate(2, 1, 3),
            Err(IgemmError::Kernel(KernelError::BufferTooSmall { what: "indirect input row", .. }))
        ));
        assert!(matches!(
            a.validate(2, 2, 1),
            Err(IgemmError::Kernel(KernelError::BufferTooSmall { what: "indirection buffer", .. }))
        ));
    }

    #[test]
    fn output_dimensions_follow_padding_and_dilation() {
        let g = Conv2dGeometry {
            input_height: 5,
            input_width: 7,
            kernel_height: 3,
            kernel_width: 3,
            dilation_width: 2,
            subsampling_height: 2,
            padding_top: 1,
            padding_bottom: 1,
            ..Conv2dGeometry::default()
        };
        assert_eq!(g.output_height(), 3);
        assert_eq!(g.output_width(), 3);
    }

    #[test]
    fn padded_taps_become_zero_rows() {
        // 2x2 input, 3x3 kernel, padding 1 on every side: output 2x2.
        let g = Conv2dGeometry {
            input_height: 2,
            input_width: 2,
            input_pixel_stride: 4,
            kernel_height: 3,
            kernel_width: 3,
            padding_top: 1,
            padding_right: 1,
            padding_bottom: 1,
            padding_left: 1,
            ..Conv2dGeometry::default()
        };
        let ind = conv2d_indirection(&g, 4).unwrap();
        assert_eq!(ind.output_size, 4);
        assert_eq!(ind.tile_count(), 1);
        assert_eq!(ind.rows.len(), 4 * 9);

        // Output (0, 0): the centre tap reads pixel (0, 0), the top-left tap is padding.
        assert_eq!(ind.rows[4 * 4], IndirectRow::Input(0));
        assert_eq!(ind.rows[0], IndirectRow::Zero);
        // Output (1, 1), bottom-right tap is padding, top-left tap reads pixel (0, 0).
        assert_eq!(ind.rows[8 * 4 + 3], IndirectRow::Zero);
        assert_eq!(ind.rows[3], IndirectRow::Input(0));
        // Every output sees exactly four real pixels.
        for pixel in 0..4 {
            let real = (0..9)
                .filter(|tap| matches!(ind.rows[tap * 4 + pixel], IndirectRow::Input(_)))
                .count();
            assert_eq!(real, 4);
        }
    }

    #[test]
    fn partial_tile_repeats_last_pixel() {
        let g = Conv2dGeometry { input_height: 1, input_width: 5, ..Conv2dGeometry::default() };
        let ind = conv2d_indirection(&g, 3).unwrap();
        assert_eq!(ind.tile_count(), 2);
        assert_eq!(
            ind.tile(1),
            &[IndirectRow::Input(3), IndirectRow::Input(4), IndirectRow::Input(4)]
        );
    }

    #[test]
    fn rejects_degenerate_geometry() {
        let g = Conv2dGeometry { kernel_width: 0, ..Conv2dGeometry::default() };
        assert!(matches!(
            conv2d_indirection(&g, 1),
            Err(IgemmError::Kernel(KernelError::InvalidGeometry { .. }))
        ));
        let g = Conv2dGeometry { input_width: 2, kernel_width: 3, ..Conv2dGeometry::default() };
        assert!(conv2d_indirection(&g, 1).is_err());
        assert!(conv2d_indirection(&Conv2dGeometry::default(), 0).is_err());
    }
}
