//! CUDA C source for the kernel set, compiled with NVRTC at backend creation

pub(super) const MODULE_NAME: &str = "feedfwd";

pub(super) const KERNEL_NAMES: &[&str] = &[
    "setconstval_kernel",
    "costxent_kernel",
    "deltaxent_kernel",
    "hadamard_kernel",
    "identity_kernel",
    "sigmoid_kernel",
    "tanh_kernel",
    "arctan_kernel",
    "relu_kernel",
    "softmax_columns_kernel",
];

pub(super) const KERNEL_SOURCE: &str = r#"
extern "C" __global__ void setconstval_kernel(const int Lx, const float const_val, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = const_val;
}

extern "C" __global__ void costxent_kernel(const int Lx, const float* yhat, const float* y, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = -(y[k] * logf(yhat[k]) + (1.0f - y[k]) * logf(1.0f - yhat[k]));
}

extern "C" __global__ void deltaxent_kernel(const int Lx, const float* yhat, const float* y, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = (yhat[k] - y[k]) / (yhat[k] * (1.0f - yhat[k]));
}

extern "C" __global__ void hadamard_kernel(const int Lx, const float* a, float* b) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    b[k] = a[k] * b[k];
}

extern "C" __global__ void identity_kernel(const int Lx, const float* in, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = in[k];
}

extern "C" __global__ void sigmoid_kernel(const int Lx, const float* in, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = 1.0f / (1.0f + expf(-in[k]));
}

extern "C" __global__ void tanh_kernel(const int Lx, const float* in, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = tanhf(in[k]);
}

extern "C" __global__ void arctan_kernel(const int Lx, const float* in, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = atanf(in[k]);
}

extern "C" __global__ void relu_kernel(const int Lx, const float* in, float* out) {
    int k = blockIdx.x * blockDim.x + threadIdx.x;
    if (k >= Lx) return;
    out[k] = fmaxf(in[k], 0.0f);
}

extern "C" __global__ void softmax_columns_kernel(const int rows, const int cols, const float* in, float* out) {
    int j = blockIdx.x * blockDim.x + threadIdx.x;
    if (j >= cols) return;
    const float* column = in + (size_t)j * rows;
    float* dst = out + (size_t)j * rows;
    float max = -__int_as_float(0x7f800000);
    for (int i = 0; i < rows; ++i) max = fmaxf(max, column[i]);
    float sum = 0.0f;
    for (int i = 0; i < rows; ++i) {
        dst[i] = expf(column[i] - max);
        sum += dst[i];
    }
    for (int i = 0; i < rows; ++i) dst[i] /= sum;
}
"#;
