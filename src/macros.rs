#[macro_export]
#[cfg(feature = "color")]
macro_rules! underline {
    ($str:expr) => {
        $str.underline()
    };
}

#[macro_export]
#[cfg(not(feature = "color"))]
macro_rules! underline {
    ($str:expr) => {
        $str
    };
}

#[macro_export]
#[cfg(feature = "color")]
macro_rules! bold {
    ($str:expr) => {
        $str.bold()
    };
}

#[macro_export]
#[cfg(not(feature = "color"))]
macro_rules! bold {
    ($str:expr) => {
        $str
    };
}
