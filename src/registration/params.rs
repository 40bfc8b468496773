use crate::error::Error;

/// How the maximum correspondence distance is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMode {
    /// The value is a distance in cloud units.
    Absolute,
    /// The value is a fraction of the larger cloud diameter.
    Relative,
}

#[derive(Debug, Clone, Copy)]
pub struct MaxCorrespondenceDistance {
    pub mode: DistanceMode,
    pub value: f64,
}

impl MaxCorrespondenceDistance {
    pub fn absolute(value: f64) -> Self {
        Self {
            mode: DistanceMode::Absolute,
            value,
        }
    }

    pub fn relative(value: f64) -> Self {
        Self {
            mode: DistanceMode::Relative,
            value,
        }
    }

    /// Resolve into an absolute distance given the cloud scale.
    pub fn resolve(&self, cloud_diameter: f64) -> f64 {
        match self.mode {
            DistanceMode::Absolute => self.value,
            DistanceMode::Relative => self.value * cloud_diameter,
        }
    }
}

/// Parameters of the fast global registration algorithm.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationParams {
    /// Residual threshold below which a correspondence counts as an inlier
    /// once the annealing has finished.
    pub max_correspondence_distance: MaxCorrespondenceDistance,
    /// Maximum number of outer iterations.
    pub max_iterations: usize,
    /// Maximum number of correspondence triplets kept by the tuple test.
    pub max_tuples: usize,
    /// Minimum descriptor cosine similarity for a candidate pair, in [0, 1].
    pub similarity_threshold: f64,
    /// Tuple test length-ratio tolerance, in (0, 1). A triplet survives if
    /// every pairwise length ratio between the clouds lies in
    /// (tuple_scale, 1 / tuple_scale).
    pub tuple_scale: f64,
    /// Divisor applied to mu at each annealing step. Must be > 1.
    pub gnc_factor: f64,
    /// Outer iterations between two annealing steps.
    pub iterations_per_level: usize,
    /// Stop when the se(3) update norm falls below this.
    pub update_tolerance: f64,
    /// Fewer surviving correspondences than this is a convergence failure.
    pub min_correspondences: usize,
    /// Keep only mutually-nearest descriptor pairs.
    pub mutual_filter: bool,
    /// Seed for the tuple sampling; fixed so runs are reproducible.
    pub seed: u64,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            max_correspondence_distance: MaxCorrespondenceDistance::relative(0.05),
            max_iterations: 64,
            max_tuples: 1000,
            similarity_threshold: 0.9,
            tuple_scale: 0.95,
            gnc_factor: 1.4,
            iterations_per_level: 4,
            update_tolerance: 1e-10,
            min_correspondences: 10,
            mutual_filter: true,
            seed: 0x5eed,
        }
    }
}

impl RegistrationParams {
    pub fn max_iterations(&mut self, value: usize) -> &mut Self {
        self.max_iterations = value;
        self
    }

    pub fn max_tuples(&mut self, value: usize) -> &mut Self {
        self.max_tuples = value;
        self
    }

    pub fn similarity_threshold(&mut self, value: f64) -> &mut Self {
        self.similarity_threshold = value;
        self
    }

    pub fn gnc_factor(&mut self, value: f64) -> &mut Self {
        self.gnc_factor = value;
        self
    }

    pub fn max_correspondence_distance(&mut self, value: MaxCorrespondenceDistance) -> &mut Self {
        self.max_correspondence_distance = value;
        self
    }

    /// Check every field before any computation starts.
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_correspondence_distance.value <= 0.0 {
            return Err(Error::invalid_configuration(
                "max_correspondence_distance must be positive",
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::invalid_configuration(
                "max_iterations must be greater than zero",
            ));
        }
        if self.max_tuples == 0 {
            return Err(Error::invalid_configuration(
                "max_tuples must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(Error::invalid_configuration(
                "similarity_threshold must be in [0, 1]",
            ));
        }
        if !(self.tuple_scale > 0.0 && self.tuple_scale < 1.0) {
            return Err(Error::invalid_configuration(
                "tuple_scale must be in (0, 1)",
            ));
        }
        if self.gnc_factor <= 1.0 {
            return Err(Error::invalid_configuration(
                "gnc_factor must be greater than 1",
            ));
        }
        if self.iterations_per_level == 0 {
            return Err(Error::invalid_configuration(
                "iterations_per_level must be greater than zero",
            ));
        }
        if self.update_tolerance <= 0.0 {
            return Err(Error::invalid_configuration(
                "update_tolerance must be positive",
            ));
        }
        if self.min_correspondences < 3 {
            return Err(Error::invalid_configuration(
                "min_correspondences must be at least 3",
            ));
        }
        Ok(())
    }
}
