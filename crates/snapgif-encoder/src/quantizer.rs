//! Neural-network color quantizer
//!
//! A competitive-learning quantizer in the NeuQuant family: 256 neurons are
//! pulled towards sampled pixel colors with a decaying learning rate and
//! neighbourhood radius, then sorted by green so lookups can prune the search.
//! Every image gets its own [`Quantizer`]; nothing is shared between calls.

const NETSIZE: usize = 256;
const MAX_NET_POS: usize = NETSIZE - 1;

// Strides chosen so sampling walks the whole buffer pseudo-randomly
const PRIME1: usize = 499;
const PRIME2: usize = 491;
const PRIME3: usize = 487;
const PRIME4: usize = 503;
const MIN_PICTURE_BYTES: usize = 3 * PRIME4;

const NET_BIAS_SHIFT: i32 = 4;
const N_CYCLES: usize = 100;

const INT_BIAS_SHIFT: i32 = 16;
const INT_BIAS: i32 = 1 << INT_BIAS_SHIFT;
const GAMMA_SHIFT: i32 = 10;
const BETA_SHIFT: i32 = 10;
const BETA: i32 = INT_BIAS >> BETA_SHIFT;
const BETA_GAMMA: i32 = INT_BIAS << (GAMMA_SHIFT - BETA_SHIFT);

const INIT_RAD: usize = NETSIZE >> 3;
const RADIUS_BIAS_SHIFT: i32 = 6;
const RADIUS_BIAS: i32 = 1 << RADIUS_BIAS_SHIFT;
const INIT_RADIUS: i32 = INIT_RAD as i32 * RADIUS_BIAS;
const RADIUS_DEC: i32 = 30;

const ALPHA_BIAS_SHIFT: i32 = 10;
const INIT_ALPHA: i32 = 1 << ALPHA_BIAS_SHIFT;
const RAD_BIAS_SHIFT: i32 = 8;
const RAD_BIAS: i32 = 1 << RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS: i32 = 1 << (ALPHA_BIAS_SHIFT + RAD_BIAS_SHIFT);

#[derive(Debug, Clone, Copy, Default)]
struct Neuron {
    r: i32,
    g: i32,
    b: i32,
    /// Position of this color in the output table
    index: usize,
}

/// A palette of at most 256 RGB entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorTable {
    rgb: Vec<u8>,
}

impl ColorTable {
    /// Build a table from packed RGB triples
    pub fn from_rgb(rgb: Vec<u8>) -> Self {
        debug_assert!(rgb.len() % 3 == 0 && rgb.len() <= NETSIZE * 3);
        Self { rgb }
    }

    /// Number of colors
    pub fn len(&self) -> usize {
        self.rgb.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.rgb.is_empty()
    }

    /// Color at `index`
    pub fn color(&self, index: usize) -> Option<[u8; 3]> {
        self.rgb
            .get(index * 3..index * 3 + 3)
            .map(|c| [c[0], c[1], c[2]])
    }

    /// Packed RGB bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.rgb
    }

    /// Table size as a power of two exponent, in `1..=8`
    pub fn size_bits(&self) -> u8 {
        let mut bits = 1;
        while (1usize << bits) < self.len() && bits < 8 {
            bits += 1;
        }
        bits
    }
}

/// Trained quantizer for one image
pub struct Quantizer {
    network: Vec<Neuron>,
    net_index: [usize; 256],
    bias: Vec<i32>,
    freq: Vec<i32>,
    rad_power: [i32; INIT_RAD],
    sample_fac: usize,
}

impl Quantizer {
    /// Train a quantizer on packed RGB pixels.
    ///
    /// `quality` is the sampling interval: 1 examines every pixel, 100 roughly
    /// one in a hundred.
    pub fn new(pixels: &[u8], quality: u8) -> Self {
        let mut quantizer = Self::untrained(quality);
        quantizer.learn(pixels);
        quantizer.unbias();
        quantizer.build_index();
        quantizer
    }

    fn untrained(quality: u8) -> Self {
        let network = (0..NETSIZE)
            .map(|i| {
                let v = ((i << (NET_BIAS_SHIFT + 8)) / NETSIZE) as i32;
                Neuron {
                    r: v,
                    g: v,
                    b: v,
                    index: i,
                }
            })
            .collect();

        Self {
            network,
            net_index: [0; 256],
            bias: vec![0; NETSIZE],
            freq: vec![INT_BIAS / NETSIZE as i32; NETSIZE],
            rad_power: [0; INIT_RAD],
            sample_fac: quality.clamp(1, 100) as usize,
        }
    }

    fn learn(&mut self, pixels: &[u8]) {
        let length = pixels.len() - pixels.len() % 3;
        if length == 0 {
            return;
        }

        let sample_fac = if length < MIN_PICTURE_BYTES {
            1
        } else {
            self.sample_fac
        };
        let alpha_dec = 30 + ((sample_fac as i32 - 1) / 3);
        let sample_pixels = length / (3 * sample_fac);
        let delta = (sample_pixels / N_CYCLES).max(1);

        let mut alpha = INIT_ALPHA;
        let mut radius = INIT_RADIUS;
        let mut rad = radius >> RADIUS_BIAS_SHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.update_rad_power(rad, alpha);

        let step = if length < MIN_PICTURE_BYTES {
            3
        } else if length % PRIME1 != 0 {
            3 * PRIME1
        } else if length % PRIME2 != 0 {
            3 * PRIME2
        } else if length % PRIME3 != 0 {
            3 * PRIME3
        } else {
            3 * PRIME4
        };

        let mut pos = 0;
        for i in 1..=sample_pixels {
            let r = (pixels[pos] as i32) << NET_BIAS_SHIFT;
            let g = (pixels[pos + 1] as i32) << NET_BIAS_SHIFT;
            let b = (pixels[pos + 2] as i32) << NET_BIAS_SHIFT;

            let winner = self.contest(r, g, b);
            self.alter_single(alpha, winner, r, g, b);
            if rad != 0 {
                self.alter_neighbours(rad, winner, r, g, b);
            }

            pos += step;
            if pos >= length {
                pos -= length;
            }

            if i % delta == 0 {
                alpha -= alpha / alpha_dec;
                radius -= radius / RADIUS_DEC;
                rad = radius >> RADIUS_BIAS_SHIFT;
                if rad <= 1 {
                    rad = 0;
                }
                self.update_rad_power(rad, alpha);
            }
        }
    }

    fn update_rad_power(&mut self, rad: i32, alpha: i32) {
        let rad_sq = rad * rad;
        for i in 0..rad {
            self.rad_power[i as usize] = alpha * (((rad_sq - i * i) * RAD_BIAS) / rad_sq);
        }
    }

    /// Find the closest neuron, biased towards rarely chosen ones, and update
    /// the frequency and bias terms.
    fn contest(&mut self, r: i32, g: i32, b: i32) -> usize {
        let mut best_d = i32::MAX;
        let mut best_bias_d = i32::MAX;
        let mut best_pos = 0;
        let mut best_bias_pos = 0;

        for i in 0..NETSIZE {
            let n = &self.network[i];
            let dist = (n.r - r).abs() + (n.g - g).abs() + (n.b - b).abs();
            if dist < best_d {
                best_d = dist;
                best_pos = i;
            }
            let bias_dist = dist - (self.bias[i] >> (INT_BIAS_SHIFT - NET_BIAS_SHIFT));
            if bias_dist < best_bias_d {
                best_bias_d = bias_dist;
                best_bias_pos = i;
            }
            let beta_freq = self.freq[i] >> BETA_SHIFT;
            self.freq[i] -= beta_freq;
            self.bias[i] += beta_freq << GAMMA_SHIFT;
        }

        self.freq[best_pos] += BETA;
        self.bias[best_pos] -= BETA_GAMMA;
        best_bias_pos
    }

    fn alter_single(&mut self, alpha: i32, i: usize, r: i32, g: i32, b: i32) {
        let n = &mut self.network[i];
        n.r -= (alpha * (n.r - r)) / INIT_ALPHA;
        n.g -= (alpha * (n.g - g)) / INIT_ALPHA;
        n.b -= (alpha * (n.b - b)) / INIT_ALPHA;
    }

    fn alter_neighbours(&mut self, rad: i32, i: usize, r: i32, g: i32, b: i32) {
        let center = i as i32;
        let lo = (center - rad).max(-1);
        let hi = (center + rad).min(NETSIZE as i32);

        let mut up = center + 1;
        let mut down = center - 1;
        let mut m = 1;
        while up < hi || down > lo {
            let a = self.rad_power[m];
            m += 1;
            if up < hi {
                let n = &mut self.network[up as usize];
                n.r -= (a * (n.r - r)) / ALPHA_RAD_BIAS;
                n.g -= (a * (n.g - g)) / ALPHA_RAD_BIAS;
                n.b -= (a * (n.b - b)) / ALPHA_RAD_BIAS;
                up += 1;
            }
            if down > lo {
                let n = &mut self.network[down as usize];
                n.r -= (a * (n.r - r)) / ALPHA_RAD_BIAS;
                n.g -= (a * (n.g - g)) / ALPHA_RAD_BIAS;
                n.b -= (a * (n.b - b)) / ALPHA_RAD_BIAS;
                down -= 1;
            }
        }
    }

    fn unbias(&mut self) {
        for (i, n) in self.network.iter_mut().enumerate() {
            n.r = (n.r >> NET_BIAS_SHIFT).clamp(0, 255);
            n.g = (n.g >> NET_BIAS_SHIFT).clamp(0, 255);
            n.b = (n.b >> NET_BIAS_SHIFT).clamp(0, 255);
            n.index = i;
        }
    }

    /// Sort the network by green and index the first position of each value
    fn build_index(&mut self) {
        let mut previous_col = 0usize;
        let mut start_pos = 0usize;

        for i in 0..NETSIZE {
            let mut small_pos = i;
            let mut small_val = self.network[i].g;
            for j in (i + 1)..NETSIZE {
                if self.network[j].g < small_val {
                    small_pos = j;
                    small_val = self.network[j].g;
                }
            }
            self.network.swap(i, small_pos);

            let small_val = small_val as usize;
            if small_val != previous_col {
                self.net_index[previous_col] = (start_pos + i) >> 1;
                for j in (previous_col + 1)..small_val {
                    self.net_index[j] = i;
                }
                previous_col = small_val;
                start_pos = i;
            }
        }

        self.net_index[previous_col] = (start_pos + MAX_NET_POS) >> 1;
        for j in (previous_col + 1)..256 {
            self.net_index[j] = MAX_NET_POS;
        }
    }

    /// The trained palette, in index order
    pub fn color_table(&self) -> ColorTable {
        let mut rgb = vec![0u8; NETSIZE * 3];
        for n in &self.network {
            let at = n.index * 3;
            rgb[at] = n.r as u8;
            rgb[at + 1] = n.g as u8;
            rgb[at + 2] = n.b as u8;
        }
        ColorTable::from_rgb(rgb)
    }

    /// Index of the nearest palette color by Euclidean distance.
    ///
    /// Works for any input color, including ones never seen during training.
    pub fn index_of(&self, r: u8, g: u8, b: u8) -> u8 {
        let (r, g, b) = (r as i32, g as i32, b as i32);
        let mut best_d = i32::MAX;
        let mut best = 0;

        let start = self.net_index[g as usize];
        let mut up = start;
        let mut down = start as isize - 1;

        while up < NETSIZE || down >= 0 {
            if up < NETSIZE {
                let n = &self.network[up];
                let dg = n.g - g;
                if dg >= 0 && dg * dg >= best_d {
                    up = NETSIZE;
                } else {
                    up += 1;
                    let d = dg * dg + (n.r - r) * (n.r - r) + (n.b - b) * (n.b - b);
                    if d < best_d {
                        best_d = d;
                        best = n.index;
                    }
                }
            }
            if down >= 0 {
                let n = &self.network[down as usize];
                let dg = g - n.g;
                if dg >= 0 && dg * dg >= best_d {
                    down = -1;
                } else {
                    down -= 1;
                    let d = dg * dg + (n.r - r) * (n.r - r) + (n.b - b) * (n.b - b);
                    if d < best_d {
                        best_d = d;
                        best = n.index;
                    }
                }
            }
        }

        best as u8
    }

    /// Map packed RGB pixels to palette indices
    pub fn map_pixels(&self, pixels: &[u8], out: &mut Vec<u8>) {
        out.clear();
        out.reserve(pixels.len() / 3);
        out.extend(
            pixels
                .chunks_exact(3)
                .map(|px| self.index_of(px[0], px[1], px[2])),
        );
    }
}
